//! A pointer-like handle over remotely registered memory.

use std::mem;
use std::ptr;
use std::time::{Duration, Instant};

use crate::rdma::rc::ReliableEndpoint;
use crate::rdma::wc::Wc;
use crate::utils::fatal::fatal;

/// A non-thread-safe pointer to remote memory with C-pointer-like
/// ergonomics and explicit commit/invalidate semantics.
///
/// Binds a connection, a remote address, and a local staging buffer. The
/// staging buffer caches the remote object: reads are served locally while
/// the cached copy is valid, and writes reach the remote side only on
/// [`commit`](Self::commit).
///
/// The local buffer must lie within a locally registered MR, hold at least
/// `size_of::<T>()` bytes, and be suitably aligned for `T`; different
/// handles should stage through different buffers unless sharing is
/// intended. Atomic operations additionally require `size_of::<T>() == 8`
/// and an 8-byte-aligned remote address; on any other `T` they perform no
/// network traffic and return a default-constructed value.
///
/// Sharing one handle between threads is a programmer error.
pub struct RemotePtr<'a, T: Copy + Default> {
    ep: &'a ReliableEndpoint,
    remote: u64,
    local: *mut u8,
    valid: bool,
    refresh: bool,

    _marker: std::marker::PhantomData<T>,
}

impl<'a, T: Copy + Default> RemotePtr<'a, T> {
    /// Bind a remote address and a local staging buffer to an endpoint.
    /// The staged copy starts invalid.
    pub fn new(ep: &'a ReliableEndpoint, remote: u64, local: *mut u8) -> Self {
        Self {
            ep,
            remote,
            local,
            valid: false,
            refresh: false,
            _marker: std::marker::PhantomData,
        }
    }

    /// As [`new`](Self::new), but with volatile semantics: every
    /// dereference re-reads the remote side regardless of validity.
    pub fn new_volatile(ep: &'a ReliableEndpoint, remote: u64, local: *mut u8) -> Self {
        Self {
            refresh: true,
            ..Self::new(ep, remote, local)
        }
    }

    /// The remote address this handle points at.
    #[inline]
    pub fn remote_addr(&self) -> u64 {
        self.remote
    }

    /// Whether the remote address is null.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.remote == 0
    }

    /// Point the handle at a new remote address. Invalidates the staged
    /// copy when the address actually changes.
    pub fn set_remote(&mut self, remote: u64) -> &mut Self {
        if remote != self.remote {
            self.remote = remote;
            self.valid = false;
        }
        self
    }

    /// Whether the staged local copy is considered up to date.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Manually mark the staged copy as up to date.
    #[inline]
    pub fn validate(&mut self) -> &mut Self {
        self.valid = true;
        self
    }

    /// Manually mark the staged copy as stale.
    #[inline]
    pub fn invalidate(&mut self) -> &mut Self {
        self.valid = false;
        self
    }

    /// Dereference: return the staged copy, fetching it from the remote
    /// side first when it is stale (or always, for a volatile handle). The
    /// fetch is synchronous.
    pub fn get(&mut self) -> &T {
        if !self.valid || self.refresh {
            if let Err(e) = self
                .ep
                .read(self.local, self.remote, mem::size_of::<T>(), true, 0)
            {
                fatal(format_args!("remote ptr read failed: {}", e));
            }
            self.ep.poll_send(1);
            self.valid = true;
        }
        self.local_ref()
    }

    /// Access the staged copy without touching the network, whether or not
    /// it is valid.
    #[inline]
    pub fn local(&self) -> &T {
        self.local_ref()
    }

    /// Mutably access the staged copy without touching the network. Commit
    /// afterwards to publish the change.
    #[inline]
    pub fn local_mut(&mut self) -> &mut T {
        // SAFETY: the constructor contract guarantees a valid, exclusive
        // staging buffer of at least `size_of::<T>()` bytes.
        unsafe { &mut *(self.local as *mut T) }
    }

    /// Commit the whole staged object to the remote side and mark the copy
    /// valid.
    pub fn commit(&mut self, sync: bool) {
        self.valid = true;
        self.commit_range(0, mem::size_of::<T>(), sync);
    }

    /// Commit part of the staged object. Requires a valid staged copy and
    /// does not promote validity of the affected range: the local view of
    /// the rest of the object may lag until an explicit re-read.
    pub fn commit_range(&mut self, offset: usize, len: usize, sync: bool) {
        if self.valid {
            if let Err(e) = self.ep.write(
                self.remote + offset as u64,
                // SAFETY: in-bounds per the constructor contract.
                unsafe { self.local.add(offset) },
                len,
                true,
                0,
            ) {
                fatal(format_args!("remote ptr write failed: {}", e));
            }
            if sync {
                self.ep.poll_send(1);
            }
        }
    }

    /// Store a new value into the staging buffer and commit it whole.
    pub fn update(&mut self, value: T, sync: bool) {
        *self.local_mut() = value;
        self.commit(sync);
    }

    /// Perform a remote compare-and-swap and validate the staged copy.
    ///
    /// Stages `compare` locally first; after the operation the staging
    /// buffer holds the remote cell's prior value. Returns `true` iff the
    /// swap took effect.
    pub fn compare_exchange(&mut self, compare: T, exchange: T, sync: bool) -> bool
    where
        T: PartialEq,
    {
        if mem::size_of::<T>() != mem::size_of::<u64>() {
            return false;
        }
        *self.local_mut() = compare;
        if let Err(e) =
            self.ep
                .atomic_cas(self.remote, self.local as *mut u64, as_u64(&exchange), true, 0)
        {
            fatal(format_args!("remote ptr CAS failed: {}", e));
        }
        if sync {
            self.ep.poll_send(1);
        }
        self.valid = true;
        *self.local_ref() == compare
    }

    /// Perform a remote masked compare-and-swap and validate the staged
    /// copy. Returns `true` iff the swap took effect.
    pub fn masked_compare_exchange(
        &mut self,
        compare: T,
        compare_mask: u64,
        exchange: T,
        exchange_mask: u64,
        sync: bool,
    ) -> bool
    where
        T: PartialEq,
    {
        if mem::size_of::<T>() != mem::size_of::<u64>() {
            return false;
        }
        *self.local_mut() = compare;
        if let Err(e) = self.ep.masked_cas(
            self.remote,
            self.local as *mut u64,
            compare_mask,
            as_u64(&exchange),
            exchange_mask,
            sync,
            0,
        ) {
            fatal(format_args!("remote ptr masked CAS failed: {}", e));
        }
        if sync {
            self.ep.poll_send(1);
        }
        self.valid = true;
        *self.local_ref() == compare
    }

    /// Perform a remote fetch-and-add; the fetched prior value lands in the
    /// staging buffer and is returned.
    pub fn fetch_add(&mut self, add: u64, sync: bool) -> T {
        if mem::size_of::<T>() != mem::size_of::<u64>() {
            return T::default();
        }
        if let Err(e) = self
            .ep
            .atomic_faa(self.remote, self.local as *mut u64, add, sync, 0)
        {
            fatal(format_args!("remote ptr FAA failed: {}", e));
        }
        if sync {
            self.ep.poll_send(1);
        }
        self.valid = true;
        *self.local_ref()
    }

    /// Perform a remote fetch-and-add confined to the bitfield
    /// `[lowest_bit, highest_bit]`. The addend is applied inside the field;
    /// do not shift it beforehand.
    pub fn field_fetch_add(
        &mut self,
        add: u64,
        highest_bit: u32,
        lowest_bit: u32,
        sync: bool,
    ) -> T {
        if mem::size_of::<T>() != mem::size_of::<u64>() {
            return T::default();
        }
        if let Err(e) = self.ep.field_faa(
            self.remote,
            self.local as *mut u64,
            add,
            highest_bit,
            lowest_bit,
            sync,
            0,
        ) {
            fatal(format_args!("remote ptr field FAA failed: {}", e));
        }
        if sync {
            self.ep.poll_send(1);
        }
        self.valid = true;
        *self.local_ref()
    }

    /// Perform a remote masked fetch-and-add with an explicit per-field
    /// carry boundary mask.
    pub fn masked_fetch_add(&mut self, add: u64, boundary_mask: u64, sync: bool) -> T {
        if mem::size_of::<T>() != mem::size_of::<u64>() {
            return T::default();
        }
        if let Err(e) = self
            .ep
            .masked_faa(self.remote, self.local as *mut u64, add, boundary_mask, sync, 0)
        {
            fatal(format_args!("remote ptr masked FAA failed: {}", e));
        }
        if sync {
            self.ep.poll_send(1);
        }
        self.valid = true;
        *self.local_ref()
    }

    /// As [`field_fetch_add`](Self::field_fetch_add), but give up waiting
    /// for the completion once `time_limit_us` microseconds have elapsed.
    ///
    /// On timeout, sets `success` to `false` and returns a default value;
    /// the posted work request stays outstanding and its completion must
    /// still be drained by a later poll. A zero deadline reports failure
    /// without blocking.
    pub fn field_fetch_add_timelimit(
        &mut self,
        time_limit_us: u64,
        success: &mut bool,
        add: u64,
        highest_bit: u32,
        lowest_bit: u32,
        sync: bool,
    ) -> T {
        if mem::size_of::<T>() != mem::size_of::<u64>() {
            *success = false;
            return T::default();
        }
        if let Err(e) = self.ep.field_faa(
            self.remote,
            self.local as *mut u64,
            add,
            highest_bit,
            lowest_bit,
            sync,
            0,
        ) {
            fatal(format_args!("remote ptr field FAA failed: {}", e));
        }
        if sync && !self.wait_with_deadline(time_limit_us) {
            *success = false;
            return T::default();
        }
        *success = true;
        self.valid = true;
        *self.local_ref()
    }

    /// As [`masked_fetch_add`](Self::masked_fetch_add), with the same
    /// deadline semantics as
    /// [`field_fetch_add_timelimit`](Self::field_fetch_add_timelimit).
    pub fn masked_fetch_add_timelimit(
        &mut self,
        time_limit_us: u64,
        success: &mut bool,
        add: u64,
        boundary_mask: u64,
        sync: bool,
    ) -> T {
        if mem::size_of::<T>() != mem::size_of::<u64>() {
            *success = false;
            return T::default();
        }
        if let Err(e) = self
            .ep
            .masked_faa(self.remote, self.local as *mut u64, add, boundary_mask, sync, 0)
        {
            fatal(format_args!("remote ptr masked FAA failed: {}", e));
        }
        if sync && !self.wait_with_deadline(time_limit_us) {
            *success = false;
            return T::default();
        }
        *success = true;
        self.valid = true;
        *self.local_ref()
    }

    /// Reinterpret the pointer at the given offset as a handle to a member
    /// or subpart. The derived handle shares the endpoint, carries both
    /// addresses offset accordingly, and inherits the current validity.
    pub fn reinterpret_at<U: Copy + Default>(&self, offset: usize) -> RemotePtr<'a, U> {
        RemotePtr {
            ep: self.ep,
            remote: self.remote + offset as u64,
            local: self.local.wrapping_add(offset),
            valid: self.valid,
            refresh: false,
            _marker: std::marker::PhantomData,
        }
    }

    /// Busy-poll the send CQ for one completion, bounded by the deadline.
    /// Returns whether a completion arrived in time.
    fn wait_with_deadline(&self, time_limit_us: u64) -> bool {
        let deadline = Duration::from_micros(time_limit_us);
        let start = Instant::now();
        let mut wc = [Wc::default(); 1];
        loop {
            if start.elapsed() >= deadline {
                return false;
            }
            if self.ep.poll_send_once(&mut wc) > 0 {
                return true;
            }
        }
    }

    #[inline]
    fn local_ref(&self) -> &T {
        // SAFETY: the constructor contract guarantees a valid staging
        // buffer of at least `size_of::<T>()` bytes.
        unsafe { &*(self.local as *const T) }
    }
}

/// Bitwise view of an 8-byte value. Callers check the size first.
#[inline]
fn as_u64<T: Copy>(v: &T) -> u64 {
    debug_assert_eq!(mem::size_of::<T>(), mem::size_of::<u64>());
    // SAFETY: only reached behind a size check; `T` may be under-aligned.
    unsafe { ptr::read_unaligned(v as *const T as *const u64) }
}

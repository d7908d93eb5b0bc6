//! Device context: one opened RNIC, its protection domains, and the
//! registered-MR table.

use std::cell::UnsafeCell;
use std::ffi::CStr;
use std::io::Error as IoError;
use std::mem;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;

use super::exchange::{MrXchg, OobExchange};
use super::gid::Gid;
use super::mr::{range_contains, MrEntry, Permission};
use super::types::*;
use crate::bindings::*;

/// The port every queue pair binds to.
pub(crate) const PORT_NUM: PortNum = 1;

/// The GID table index used for addressing.
pub(crate) const GID_INDEX: u8 = 1;

/// Context creation error type.
#[derive(Debug, Error)]
pub enum ContextError {
    /// No RNIC at all, or no RNIC with the requested name.
    #[error("cannot find device: {0}")]
    DeviceNotFound(String),

    /// `libibverbs` interfaces returned an error.
    #[error("I/O error from ibverbs: {0}")]
    Io(#[from] IoError),
}

/// Ownership holder of the device context and everything scoped under it.
struct ContextInner {
    ctx: NonNull<ibv_context>,
    pd: NonNull<ibv_pd>,
    xrcd: NonNull<ibv_xrcd>,
    port_attr: ibv_port_attr,
    gid: Gid,

    /// Registered-MR table. Append-only: slots below `nmrs` are immutable
    /// once the count is published with `Release`, so readers on the posting
    /// fast path need no lock.
    nmrs: AtomicUsize,
    mrs: [UnsafeCell<MrEntry>; MAX_MRS],
    reg_lock: Mutex<()>,
}

// SAFETY: the raw verbs pointers are never exposed mutably, and the MR table
// follows the publication protocol documented on `mrs`.
unsafe impl Send for ContextInner {}
unsafe impl Sync for ContextInner {}

impl Drop for ContextInner {
    fn drop(&mut self) {
        let n = self.nmrs.load(Ordering::Acquire);
        // Deregister in reverse creation order.
        for i in (0..n).rev() {
            // SAFETY: slot `i` was published and never mutated afterwards.
            let entry = unsafe { *self.mrs[i].get() };
            // SAFETY: each MR is deregistered exactly once, here.
            unsafe { ibv_dereg_mr(entry.mr) };
        }
        // SAFETY: FFI; the domains and the context are destroyed exactly once
        // and in dependency order.
        unsafe {
            ibv_close_xrcd(self.xrcd.as_ptr());
            ibv_dealloc_pd(self.pd.as_ptr());
            ibv_close_device(self.ctx.as_ptr());
        }
    }
}

/// Device context.
///
/// A cheaply clonable handle: every holder (cluster, peer, endpoint) keeps a
/// clone, and the RNIC resources are released when the last clone drops.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// Open an RNIC device and allocate its protection domains.
    ///
    /// Opens the device with the given name, or the first available device
    /// when `None`. Queries port 1 attributes and GID index 1.
    pub fn open(dev_name: Option<&str>) -> Result<Self, ContextError> {
        let mut n_devices = 0;
        // SAFETY: FFI.
        let dev_list = unsafe { ibv_get_device_list(&mut n_devices) };
        if dev_list.is_null() || n_devices == 0 {
            return Err(ContextError::DeviceNotFound(
                dev_name.unwrap_or("(any)").to_owned(),
            ));
        }

        let mut target = None;
        for i in 0..n_devices as usize {
            // SAFETY: the device list holds `n_devices` valid entries.
            let dev = unsafe { *dev_list.add(i) };
            match dev_name {
                None => {
                    target = Some(dev);
                    break;
                }
                Some(wanted) => {
                    // SAFETY: FFI; a non-null return value is a valid C string.
                    let name = unsafe { ibv_get_device_name(dev) };
                    if !name.is_null()
                        && unsafe { CStr::from_ptr(name) }.to_string_lossy() == wanted
                    {
                        target = Some(dev);
                        break;
                    }
                }
            }
        }
        let Some(target) = target else {
            // SAFETY: FFI.
            unsafe { ibv_free_device_list(dev_list) };
            return Err(ContextError::DeviceNotFound(
                dev_name.unwrap_or("(any)").to_owned(),
            ));
        };

        // SAFETY: FFI.
        let ctx = unsafe { ibv_open_device(target) };
        // SAFETY: FFI; the list is no longer needed whether opening succeeded.
        unsafe { ibv_free_device_list(dev_list) };
        let ctx = NonNull::new(ctx).ok_or_else(IoError::last_os_error)?;

        check_dev_attr(ctx.as_ptr());

        // SAFETY: POD out-params filled by FFI.
        let (port_attr, gid) = unsafe {
            let mut port_attr = mem::zeroed::<ibv_port_attr>();
            ibv_query_port(ctx.as_ptr(), PORT_NUM, &mut port_attr);
            let mut gid = mem::zeroed::<ibv_gid>();
            ibv_query_gid(ctx.as_ptr(), PORT_NUM, GID_INDEX as i32, &mut gid);
            (port_attr, Gid::from(gid))
        };

        // SAFETY: FFI.
        let pd = NonNull::new(unsafe { ibv_alloc_pd(ctx.as_ptr()) })
            .ok_or_else(IoError::last_os_error)?;

        let mut xrcd_attr = ibv_xrcd_init_attr {
            comp_mask: (ibv_xrcd_init_attr_mask::IBV_XRCD_INIT_ATTR_FD
                | ibv_xrcd_init_attr_mask::IBV_XRCD_INIT_ATTR_OFLAGS)
                .0,
            fd: -1,
            oflags: libc::O_CREAT,
        };
        // SAFETY: FFI.
        let xrcd = NonNull::new(unsafe { ibv_open_xrcd(ctx.as_ptr(), &mut xrcd_attr) })
            .ok_or_else(IoError::last_os_error)?;

        Ok(Self {
            inner: Arc::new(ContextInner {
                ctx,
                pd,
                xrcd,
                port_attr,
                gid,
                nmrs: AtomicUsize::new(0),
                mrs: std::array::from_fn(|_| UnsafeCell::new(MrEntry::empty())),
                reg_lock: Mutex::new(()),
            }),
        })
    }

    /// Register a memory region.
    ///
    /// Returns the index of the region in the context's MR table, or `-1`
    /// when the table is full or registration fails.
    ///
    /// The table is append-only; regions stay registered until the last
    /// context handle drops. Populate the table before cluster bring-up:
    /// regions registered after the exchange are invisible to peers.
    pub fn register_memory(&self, addr: *mut u8, len: usize, perm: Permission) -> i32 {
        let _guard = self.inner.reg_lock.lock().unwrap();

        let n = self.inner.nmrs.load(Ordering::Relaxed);
        if n >= MAX_MRS {
            return -1;
        }

        // SAFETY: FFI.
        let mr = unsafe {
            ibv_reg_mr(
                self.inner.pd.as_ptr(),
                addr as *mut libc::c_void,
                len,
                i32::from(perm),
            )
        };
        if mr.is_null() {
            return -1;
        }

        // SAFETY: slot `n` is not yet published, and `reg_lock` serializes
        // writers; the release-store below makes the slot visible.
        unsafe {
            *self.inner.mrs[n].get() = MrEntry {
                addr: addr as u64,
                len,
                lkey: (*mr).lkey,
                rkey: (*mr).rkey,
                mr,
            };
        }
        self.inner.nmrs.store(n + 1, Ordering::Release);
        n as i32
    }

    /// Get the count of currently registered memory regions.
    #[inline]
    pub fn mr_count(&self) -> usize {
        self.inner.nmrs.load(Ordering::Acquire)
    }

    /// Match a given address range to a registered MR and return its lkey.
    /// A miss is a programmer error and kills the process.
    #[inline]
    pub(crate) fn match_local_lkey(&self, addr: u64, size: usize) -> LKey {
        let n = self.inner.nmrs.load(Ordering::Acquire);
        for slot in &self.inner.mrs[..n] {
            // SAFETY: slots below the published count are immutable.
            let entry = unsafe { *slot.get() };
            if range_contains(entry.addr, entry.len, addr, size) {
                return entry.lkey;
            }
        }
        crate::utils::fatal::fatal("cannot match local mr")
    }

    /// Fill the context part of an out-of-band exchange record: LID, GID,
    /// and the registered-MR table.
    pub(crate) fn fill_exchange(&self, xchg: &mut OobExchange) {
        xchg.lid = self.inner.port_attr.lid;
        xchg.gid = <[u8; 16]>::from(self.inner.gid);
        let n = self.inner.nmrs.load(Ordering::Acquire);
        xchg.num_mr = n as i32;
        for i in 0..n {
            // SAFETY: slots below the published count are immutable.
            let entry = unsafe { *self.inner.mrs[i].get() };
            xchg.mr[i] = MrXchg {
                addr: entry.addr,
                len: entry.len as u64,
                rkey: entry.rkey,
            };
        }
    }

    /// Get the underlying `ibv_context` pointer.
    ///
    /// This allows customized modifications to the RDMA context, but can be
    /// dangerous. Do not close the context through it.
    #[inline]
    pub fn as_raw(&self) -> *mut ibv_context {
        self.inner.ctx.as_ptr()
    }

    /// Get the underlying `ibv_pd` pointer.
    #[inline]
    pub(crate) fn pd(&self) -> *mut ibv_pd {
        self.inner.pd.as_ptr()
    }

    /// Get the underlying `ibv_xrcd` pointer.
    #[inline]
    pub(crate) fn xrcd(&self) -> *mut ibv_xrcd {
        self.inner.xrcd.as_ptr()
    }

    /// Get the LID of port 1.
    #[inline]
    pub fn lid(&self) -> Lid {
        self.inner.port_attr.lid
    }

    /// Get the GID at index 1 of port 1.
    #[inline]
    pub fn gid(&self) -> Gid {
        self.inner.gid
    }

    /// The number of live clusters, peers, and endpoints referring to this
    /// context, not counting this handle.
    #[inline]
    pub fn refcount(&self) -> usize {
        Arc::strong_count(&self.inner) - 1
    }
}

/// Probe extended device attributes and warn on missing capabilities.
///
/// Advisory only: posting a verb the device cannot execute will surface as a
/// completion error later, not here.
fn check_dev_attr(ctx: *mut ibv_context) {
    // SAFETY: POD type.
    let mut dev_attr = unsafe { mem::zeroed::<ibv_exp_device_attr>() };

    // Extended atomics.
    dev_attr.exp_device_cap_flags |=
        (IBV_EXP_DEVICE_EXT_ATOMICS | IBV_EXP_DEVICE_EXT_MASKED_ATOMICS) as u64;
    dev_attr.comp_mask |= (IBV_EXP_DEVICE_ATTR_EXP_CAP_FLAGS
        | IBV_EXP_DEVICE_ATTR_EXT_ATOMIC_ARGS
        | IBV_EXP_DEVICE_ATTR_MASKED_ATOMICS) as u32;

    // Multi-packet receive queues.
    dev_attr.comp_mask |= IBV_EXP_DEVICE_ATTR_MP_RQ as u32;

    // Erasure-coding offload.
    dev_attr.exp_device_cap_flags |= IBV_EXP_DEVICE_EC_OFFLOAD as u64;
    dev_attr.comp_mask |= (IBV_EXP_DEVICE_ATTR_EC_CAPS | IBV_EXP_DEVICE_ATTR_EC_GF_BASE) as u32;

    // SAFETY: FFI.
    unsafe { ibv_exp_query_device(ctx, &mut dev_attr) };

    let check_bit = |x: u64, mask: u64| x & mask != 0;

    if !check_bit(
        dev_attr.exp_device_cap_flags,
        IBV_EXP_DEVICE_EXT_MASKED_ATOMICS as u64,
    ) {
        log::warn!("ibv_exp: NIC does not support ext masked atomics");
    }
    if !check_bit(dev_attr.comp_mask as u64, IBV_EXP_DEVICE_ATTR_MP_RQ as u64) {
        log::warn!("ibv_exp: NIC does not support multi-packet srq");
    }
    if !check_bit(
        dev_attr.exp_device_cap_flags,
        IBV_EXP_DEVICE_EC_OFFLOAD as u64,
    ) {
        log::warn!("ibv_exp: NIC does not support EC offload");
    }
}

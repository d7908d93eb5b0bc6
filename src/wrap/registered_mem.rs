use std::ops::{Deref, DerefMut};

use anyhow::Result;

use crate::rdma::context::Context;
use crate::rdma::mr::Permission;

/// A wrapper around an owned, 8-byte-aligned memory area registered in a
/// context's MR table.
///
/// The registration lives in the context's append-only table until context
/// teardown, so a `RegisteredMem` must be kept alive for as long as the
/// context may serve RDMA traffic on it.
pub struct RegisteredMem {
    // Backing storage in `u64`s so that atomics targets are aligned.
    buf: Box<[u64]>,
    len: usize,
    index: i32,
}

impl RegisteredMem {
    /// Allocate zeroed memory of the given length and register it with all
    /// permissions.
    pub fn new(ctx: &Context, len: usize) -> Result<Self> {
        let words = len.div_ceil(std::mem::size_of::<u64>());
        let buf = vec![0u64; words].into_boxed_slice();

        let index = ctx.register_memory(buf.as_ptr() as *mut u8, len, Permission::default());
        if index < 0 {
            anyhow::bail!("cannot register memory ({} bytes)", len);
        }

        Ok(Self { buf, len, index })
    }

    /// Allocate memory that shares the same length and content with the
    /// provided slice and register it.
    pub fn new_with_content(ctx: &Context, content: &[u8]) -> Result<Self> {
        let mut ret = Self::new(ctx, content.len())?;
        ret.as_mut_slice().copy_from_slice(content);
        Ok(ret)
    }

    /// Get the address of the allocated memory.
    #[inline]
    pub fn addr(&self) -> u64 {
        self.buf.as_ptr() as u64
    }

    /// Get the length of the allocated memory.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Index of this region in the context's MR table.
    #[inline]
    pub fn mr_index(&self) -> i32 {
        self.index
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.buf.as_ptr() as *const u8
    }

    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.buf.as_mut_ptr() as *mut u8
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the buffer holds at least `len` initialized bytes.
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.len) }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: the buffer holds at least `len` initialized bytes.
        unsafe { std::slice::from_raw_parts_mut(self.buf.as_mut_ptr() as *mut u8, self.len) }
    }
}

impl Deref for RegisteredMem {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl DerefMut for RegisteredMem {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut_slice()
    }
}

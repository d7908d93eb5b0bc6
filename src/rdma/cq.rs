//! Completion queues.

use std::io::{self, Error as IoError};
use std::ptr::{self, NonNull};
use std::sync::Arc;

use super::context::Context;
use super::wc::Wc;
use crate::bindings::*;
use crate::utils::fatal::fatal;

/// Ownership holder of a completion queue.
struct CqInner {
    ctx: Context,
    cq: NonNull<ibv_cq>,
}

// SAFETY: the verbs driver allows polling a CQ from any thread.
unsafe impl Send for CqInner {}
unsafe impl Sync for CqInner {}

impl Drop for CqInner {
    fn drop(&mut self) {
        // SAFETY: destroyed exactly once, here.
        unsafe { ibv_destroy_cq(self.cq.as_ptr()) };
    }
}

/// Completion queue.
///
/// A clonable handle; endpoints that share completion queues per the
/// CQ-sharing policy hold clones, and only the last holder destroys the
/// underlying queue.
#[derive(Clone)]
pub struct Cq {
    inner: Arc<CqInner>,
}

impl Cq {
    /// Create a new completion queue of the given depth.
    pub(crate) fn new(ctx: &Context, depth: u32) -> io::Result<Self> {
        // SAFETY: FFI.
        let cq = unsafe {
            ibv_create_cq(
                ctx.as_raw(),
                depth as i32,
                ptr::null_mut(),
                ptr::null_mut(),
                0,
            )
        };
        let cq = NonNull::new(cq).ok_or_else(IoError::last_os_error)?;
        Ok(Self {
            inner: Arc::new(CqInner {
                ctx: ctx.clone(),
                cq,
            }),
        })
    }

    /// Create a completion queue or die. Endpoint construction failures are
    /// unrecoverable.
    pub(crate) fn create(ctx: &Context, depth: u32) -> Self {
        match Self::new(ctx, depth) {
            Ok(cq) => cq,
            Err(e) => fatal(format_args!("cannot create CQ: {}", e)),
        }
    }

    /// Get the underlying `ibv_cq` pointer.
    #[inline]
    pub fn as_raw(&self) -> *mut ibv_cq {
        self.inner.cq.as_ptr()
    }

    /// Get the underlying [`Context`].
    #[inline]
    pub fn context(&self) -> &Context {
        &self.inner.ctx
    }

    /// Spin until exactly `n` completions have been drained and checked.
    /// A completion with non-success status kills the process.
    pub(crate) fn drain_blocking(&self, n: usize) -> usize {
        let mut wc_arr = [Wc::default(); 32];

        let mut i = 0;
        while i < n {
            let m = (n - i).min(wc_arr.len());
            self.drain_blocking_into(&mut wc_arr[..m]);
            i += m;
        }
        n
    }

    /// Spin until the given buffer is filled with checked completions.
    pub(crate) fn drain_blocking_into(&self, wc_arr: &mut [Wc]) -> usize {
        let n = wc_arr.len();
        let mut res = 0;
        while res < n {
            // SAFETY: FFI; `Wc` is transparent over `ibv_wc`.
            let polled = unsafe {
                ibv_poll_cq(
                    self.as_raw(),
                    (n - res) as i32,
                    wc_arr[res..].as_mut_ptr().cast(),
                )
            };
            if polled < 0 {
                fatal(format_args!("poll cq failure: {}", polled));
            }
            res += polled as usize;
        }
        for wc in wc_arr.iter() {
            if !wc.status().is_success() {
                fatal(format_args!("wc failure: {}", wc.status()));
            }
        }
        res
    }

    /// Poll once without blocking; returns however many completions were
    /// available (possibly zero), all checked.
    pub(crate) fn drain_once_into(&self, wc_arr: &mut [Wc]) -> usize {
        // SAFETY: FFI; `Wc` is transparent over `ibv_wc`.
        let polled = unsafe {
            ibv_poll_cq(
                self.as_raw(),
                wc_arr.len() as i32,
                wc_arr.as_mut_ptr().cast(),
            )
        };
        if polled < 0 {
            fatal(format_args!("poll cq failure: {}", polled));
        }
        for wc in wc_arr[..polled as usize].iter() {
            if !wc.status().is_success() {
                fatal(format_args!("wc failure: {}", wc.status()));
            }
        }
        polled as usize
    }
}

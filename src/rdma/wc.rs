//! Work completion entries.

use std::ffi::CStr;
use std::{fmt, mem};

use super::types::ImmData;
use crate::bindings::*;

/// Status of a completion queue entry: the raw `ibv_wc_status` code.
///
/// Success is the only status the library tolerates while polling; anything
/// else is treated as an unrecoverable transport failure. Messages are
/// rendered through the driver's own `ibv_wc_status_str`, so there is no
/// second copy of the status vocabulary to drift out of date.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct WcStatus(pub u32);

impl WcStatus {
    /// The operation completed successfully: the work request (and all
    /// unsignaled work requests posted before it) ended and its buffers are
    /// ready to be reused.
    pub const SUCCESS: Self = Self(ibv_wc_status::IBV_WC_SUCCESS);

    /// The raw status code.
    #[inline]
    pub fn code(&self) -> u32 {
        self.0
    }

    /// Whether this status reports success.
    #[inline]
    pub fn is_success(&self) -> bool {
        self.0 == ibv_wc_status::IBV_WC_SUCCESS
    }
}

impl fmt::Display for WcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // SAFETY: FFI; the driver returns a static string for any code.
        let s = unsafe { ibv_wc_status_str(self.0) };
        if s.is_null() {
            write!(f, "status {}", self.0)
        } else {
            // SAFETY: a non-null return value is a valid C string.
            let s = unsafe { CStr::from_ptr(s) }.to_string_lossy();
            write!(f, "{} ({})", s, self.0)
        }
    }
}

impl fmt::Debug for WcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WcStatus").field(&self.0).finish()
    }
}

impl std::error::Error for WcStatus {}

/// The kind of verb a completion reports on, as this library posts them.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WcOpcode {
    /// Two-sided SEND.
    Send,
    /// One-sided WRITE.
    Write,
    /// One-sided READ.
    Read,
    /// 8-byte compare-and-swap, masked or not.
    CompSwap,
    /// 8-byte fetch-and-add, masked or not.
    FetchAdd,
    /// Incoming receive.
    Recv,
    /// Incoming receive of a write carrying immediate data.
    RecvImm,
    /// Anything else the driver reports.
    Other(u32),
}

impl From<u32> for WcOpcode {
    fn from(wc_opcode: u32) -> Self {
        match wc_opcode {
            ibv_wc_opcode::IBV_WC_SEND => WcOpcode::Send,
            ibv_wc_opcode::IBV_WC_RDMA_WRITE => WcOpcode::Write,
            ibv_wc_opcode::IBV_WC_RDMA_READ => WcOpcode::Read,
            ibv_wc_opcode::IBV_WC_COMP_SWAP => WcOpcode::CompSwap,
            ibv_wc_opcode::IBV_WC_FETCH_ADD => WcOpcode::FetchAdd,
            ibv_wc_opcode::IBV_WC_RECV => WcOpcode::Recv,
            ibv_wc_opcode::IBV_WC_RECV_RDMA_WITH_IMM => WcOpcode::RecvImm,
            x => WcOpcode::Other(x),
        }
    }
}

/// Work completion entry.
///
/// This structure transparently wraps an `ibv_wc` structure, representing
/// an entry polled from the completion queue.
#[derive(Clone, Copy)]
#[repr(transparent)]
pub struct Wc(pub ibv_wc);

unsafe impl Send for Wc {}
unsafe impl Sync for Wc {}

impl Wc {
    /// Get the work request ID.
    #[inline]
    pub fn wr_id(&self) -> u64 {
        self.0.wr_id
    }

    /// Get the completion status.
    #[inline]
    pub fn status(&self) -> WcStatus {
        WcStatus(self.0.status)
    }

    /// Get the completion status as a `Result`.
    ///
    /// - If the status is `IBV_WC_SUCCESS`, return the number of bytes processed or transferred.
    /// - Otherwise, return an error.
    #[inline]
    pub fn ok(&self) -> Result<usize, WcStatus> {
        if self.status().is_success() {
            Ok(self.bytes())
        } else {
            Err(self.status())
        }
    }

    /// Get the kind of verb this completion reports on.
    #[inline]
    pub fn opcode(&self) -> WcOpcode {
        WcOpcode::from(self.0.opcode)
    }

    /// Get the number of bytes processed or transferred.
    #[inline]
    pub fn bytes(&self) -> usize {
        self.0.byte_len as usize
    }

    /// Get the immediate data.
    #[inline]
    pub fn imm(&self) -> Option<ImmData> {
        if (self.0.wc_flags & ibv_wc_flags::IBV_WC_WITH_IMM.0) != 0 {
            Some(self.0.imm())
        } else {
            None
        }
    }
}

impl Default for Wc {
    /// Create a zeroed work completion entry.
    fn default() -> Self {
        // SAFETY: zero-initializing a POD type is safe.
        unsafe { mem::zeroed() }
    }
}

impl fmt::Debug for Wc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wc")
            .field("wr_id", &self.wr_id())
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_success() {
        let wc = Wc::default();
        assert_eq!(wc.wr_id(), 0);
        assert!(wc.status().is_success());
        assert_eq!(wc.status(), WcStatus::SUCCESS);
        assert_eq!(wc.ok(), Ok(0));
        assert_eq!(wc.imm(), None);
    }

    #[test]
    fn test_opcode_classification() {
        assert_eq!(
            WcOpcode::from(ibv_wc_opcode::IBV_WC_RDMA_READ),
            WcOpcode::Read
        );
        assert_eq!(
            WcOpcode::from(ibv_wc_opcode::IBV_WC_COMP_SWAP),
            WcOpcode::CompSwap
        );
        // Unknown codes survive classification instead of panicking.
        assert_eq!(WcOpcode::from(0xdead), WcOpcode::Other(0xdead));
    }
}

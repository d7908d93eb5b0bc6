//! Queue pair plumbing shared by both endpoint kinds: creation through the
//! experimental verbs surface and the RESET→INIT→RTR→RTS transition chain.

use std::mem;
use std::ptr::NonNull;

use super::context::{Context, GID_INDEX, PORT_NUM};
use super::cq::Cq;
use super::gid::Gid;
use super::types::*;
use crate::bindings::*;
use crate::utils::fatal::fatal;

/// Initial packet sequence number of every queue pair, both directions.
pub(crate) const INIT_PSN: Psn = 3185;

/// Queue pair state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QpState {
    /// Reset.
    Reset,
    /// Initialized.
    Init,
    /// Ready To Receive.
    Rtr,
    /// Ready To Send.
    Rts,
    /// Send Queue Drain.
    Sqd,
    /// Send Queue Error.
    Sqe,
    /// Error.
    Error,
    /// Unknown.
    Unknown,
}

impl From<u32> for QpState {
    fn from(qp_state: u32) -> Self {
        match qp_state {
            ibv_qp_state::IBV_QPS_RESET => QpState::Reset,
            ibv_qp_state::IBV_QPS_INIT => QpState::Init,
            ibv_qp_state::IBV_QPS_RTR => QpState::Rtr,
            ibv_qp_state::IBV_QPS_RTS => QpState::Rts,
            ibv_qp_state::IBV_QPS_SQD => QpState::Sqd,
            ibv_qp_state::IBV_QPS_SQE => QpState::Sqe,
            ibv_qp_state::IBV_QPS_ERR => QpState::Error,
            _ => QpState::Unknown,
        }
    }
}

impl QpState {
    /// Short name used by bring-up diagnostics.
    pub(crate) fn name(&self) -> &'static str {
        match self {
            QpState::Reset => "reset",
            QpState::Init => "init",
            QpState::Rtr => "rtr",
            QpState::Rts => "rts ok",
            QpState::Sqd => "sqd",
            QpState::Sqe => "sqe",
            QpState::Error => "error",
            QpState::Unknown => "?state",
        }
    }
}

/// An exclusively owned queue pair.
pub(crate) struct OwnedQp(NonNull<ibv_qp>);

// SAFETY: posting is not serialized here; per-thread endpoints are the
// intended model, matching the verbs driver's own thread-safety contract.
unsafe impl Send for OwnedQp {}
unsafe impl Sync for OwnedQp {}

impl Drop for OwnedQp {
    fn drop(&mut self) {
        // SAFETY: destroyed exactly once, here.
        unsafe { ibv_destroy_qp(self.0.as_ptr()) };
    }
}

impl OwnedQp {
    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut ibv_qp {
        self.0.as_ptr()
    }

    #[inline]
    pub(crate) fn qp_num(&self) -> Qpn {
        // SAFETY: the pointed-to QP is valid while `self` lives.
        unsafe { (*self.0.as_ptr()).qp_num }
    }

    /// Query the current state from the driver.
    pub(crate) fn state(&self) -> QpState {
        // SAFETY: POD out-params filled by FFI.
        let mut attr = unsafe { mem::zeroed::<ibv_qp_attr>() };
        let mut init_attr = unsafe { mem::zeroed::<ibv_qp_init_attr>() };
        // SAFETY: FFI.
        let rc = unsafe {
            ibv_query_qp(
                self.0.as_ptr(),
                &mut attr,
                ibv_qp_attr_mask::IBV_QP_STATE.0 as i32,
                &mut init_attr,
            )
        };
        if rc != 0 {
            fatal("failed to perform ibv_query_qp");
        }
        QpState::from(attr.qp_state)
    }
}

/// Create a queue pair of the given type through the experimental verbs
/// surface, with 8-byte extended-atomic operands enabled.
///
/// For XRC receive QPs, `srq` binds the QP to the shared receive queue and
/// the context XRCD. Creation failure is fatal.
pub(crate) fn create_qp(
    ctx: &Context,
    qp_type: u32,
    send_cq: &Cq,
    recv_cq: &Cq,
    srq: Option<*mut ibv_srq>,
    depth: u32,
) -> OwnedQp {
    // SAFETY: POD type.
    let mut init_attr = unsafe { mem::zeroed::<ibv_exp_qp_init_attr>() };

    init_attr.qp_type = qp_type;
    init_attr.sq_sig_all = 0;
    init_attr.send_cq = send_cq.as_raw();
    init_attr.recv_cq = recv_cq.as_raw();
    init_attr.pd = ctx.pd();
    init_attr.comp_mask = IBV_EXP_QP_INIT_ATTR_PD | IBV_EXP_QP_INIT_ATTR_ATOMICS_ARG;
    // Enable extended atomics.
    init_attr.max_atomic_arg = mem::size_of::<u64>() as u32;

    if let Some(srq) = srq {
        init_attr.xrcd = ctx.xrcd();
        init_attr.srq = srq;
        init_attr.comp_mask |= IBV_EXP_QP_INIT_ATTR_XRCD;
    }

    init_attr.cap.max_send_wr = depth;
    init_attr.cap.max_recv_wr = depth;
    init_attr.cap.max_send_sge = 16;
    init_attr.cap.max_recv_sge = 16;
    init_attr.cap.max_inline_data = 0;

    // SAFETY: FFI.
    let qp = unsafe { ibv_exp_create_qp(ctx.as_raw(), &mut init_attr) };
    match NonNull::new(qp) {
        Some(qp) => OwnedQp(qp),
        None => fatal(format_args!(
            "cannot create QP: {}",
            std::io::Error::last_os_error()
        )),
    }
}

/// RESET → INIT.
pub(crate) fn modify_to_init(qp: &OwnedQp) {
    // SAFETY: POD type.
    let mut attr = unsafe { mem::zeroed::<ibv_qp_attr>() };

    attr.qp_state = ibv_qp_state::IBV_QPS_INIT;
    attr.port_num = PORT_NUM;
    attr.pkey_index = 0;
    attr.qp_access_flags = (ibv_access_flags::IBV_ACCESS_REMOTE_READ
        | ibv_access_flags::IBV_ACCESS_REMOTE_WRITE
        | ibv_access_flags::IBV_ACCESS_REMOTE_ATOMIC)
        .0;

    let mask = ibv_qp_attr_mask::IBV_QP_STATE
        | ibv_qp_attr_mask::IBV_QP_PKEY_INDEX
        | ibv_qp_attr_mask::IBV_QP_PORT
        | ibv_qp_attr_mask::IBV_QP_ACCESS_FLAGS;

    // SAFETY: FFI.
    if unsafe { ibv_modify_qp(qp.as_ptr(), &mut attr, mask.0 as i32) } != 0 {
        fatal("failed to modify QP to INIT");
    }
}

/// INIT → RTR, pairing with the remote QP number.
pub(crate) fn modify_to_rtr(qp: &OwnedQp, gid: Gid, lid: Lid, dest_qpn: Qpn) {
    // SAFETY: POD type.
    let mut attr = unsafe { mem::zeroed::<ibv_qp_attr>() };

    attr.qp_state = ibv_qp_state::IBV_QPS_RTR;
    attr.path_mtu = ibv_mtu::IBV_MTU_4096;
    attr.dest_qp_num = dest_qpn;
    attr.rq_psn = INIT_PSN;

    attr.ah_attr.dlid = lid;
    attr.ah_attr.sl = 0;
    attr.ah_attr.src_path_bits = 0;
    attr.ah_attr.port_num = PORT_NUM;
    attr.ah_attr.is_global = 1;
    attr.ah_attr.grh.dgid = ibv_gid::from(gid);
    attr.ah_attr.grh.flow_label = 0;
    attr.ah_attr.grh.hop_limit = 1;
    attr.ah_attr.grh.sgid_index = GID_INDEX;
    attr.ah_attr.grh.traffic_class = 0;

    attr.max_dest_rd_atomic = 16;
    attr.min_rnr_timer = 12;

    let mask = ibv_qp_attr_mask::IBV_QP_STATE
        | ibv_qp_attr_mask::IBV_QP_AV
        | ibv_qp_attr_mask::IBV_QP_PATH_MTU
        | ibv_qp_attr_mask::IBV_QP_DEST_QPN
        | ibv_qp_attr_mask::IBV_QP_RQ_PSN
        | ibv_qp_attr_mask::IBV_QP_MAX_DEST_RD_ATOMIC
        | ibv_qp_attr_mask::IBV_QP_MIN_RNR_TIMER;

    // SAFETY: FFI.
    if unsafe { ibv_modify_qp(qp.as_ptr(), &mut attr, mask.0 as i32) } != 0 {
        fatal("failed to modify QP to RTR");
    }
}

/// RTR → RTS.
pub(crate) fn modify_to_rts(qp: &OwnedQp) {
    // SAFETY: POD type.
    let mut attr = unsafe { mem::zeroed::<ibv_qp_attr>() };

    attr.qp_state = ibv_qp_state::IBV_QPS_RTS;
    attr.sq_psn = INIT_PSN;
    attr.timeout = 14;
    attr.retry_cnt = 7;
    attr.rnr_retry = 7;
    attr.max_rd_atomic = 16;

    let mask = ibv_qp_attr_mask::IBV_QP_STATE
        | ibv_qp_attr_mask::IBV_QP_SQ_PSN
        | ibv_qp_attr_mask::IBV_QP_TIMEOUT
        | ibv_qp_attr_mask::IBV_QP_RETRY_CNT
        | ibv_qp_attr_mask::IBV_QP_RNR_RETRY
        | ibv_qp_attr_mask::IBV_QP_MAX_QP_RD_ATOMIC;

    // SAFETY: FFI.
    if unsafe { ibv_modify_qp(qp.as_ptr(), &mut attr, mask.0 as i32) } != 0 {
        fatal("failed to modify QP to RTS");
    }
}

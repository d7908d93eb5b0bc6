//! Extended-reliable-connected endpoints.
//!
//! The XRC fan-in/out pattern: one initiator QP carries every outgoing verb
//! (naming a destination SRQ number in each work request), one target QP
//! receives on behalf of the remote initiator, and one XRC shared receive
//! queue pools receive buffers that any remote initiator can consume.

use std::io;
use std::mem;
use std::ptr::{self, NonNull};

use super::context::Context;
use super::cq::Cq;
use super::exchange::OobExchange;
use super::gid::Gid;
use super::mr::RemoteMrTable;
use super::qp::{self, OwnedQp, QpState};
use super::rc::check_atomic_alignment;
use super::types::*;
use super::wc::Wc;
use crate::bindings::*;
use crate::utils::fatal::fatal;
use crate::utils::interop::from_c_ret;

/// Depth of the placeholder CQs attached to the unused direction of each QP.
/// The verbs API wants a CQ pointer even for directions that never complete.
const PLACEHOLDER_CQ_DEPTH: u32 = 4;

/// An exclusively owned XRC shared receive queue.
struct OwnedSrq {
    srq: NonNull<ibv_srq>,
    num: u32,
}

// SAFETY: same contract as QPs; receives may be posted from any thread the
// driver allows.
unsafe impl Send for OwnedSrq {}
unsafe impl Sync for OwnedSrq {}

impl Drop for OwnedSrq {
    fn drop(&mut self) {
        // SAFETY: destroyed exactly once, here.
        unsafe { ibv_destroy_srq(self.srq.as_ptr()) };
    }
}

impl OwnedSrq {
    /// Create an XRC-type SRQ bound to the context XRCD, completing into the
    /// given CQ.
    fn new(ctx: &Context, cq: &Cq, depth: u32) -> Self {
        // SAFETY: POD type.
        let mut init_attr = unsafe { mem::zeroed::<ibv_exp_create_srq_attr>() };
        init_attr.pd = ctx.pd();
        init_attr.xrcd = ctx.xrcd();
        init_attr.cq = cq.as_raw();
        init_attr.srq_type = IBV_EXP_SRQT_XRC;
        init_attr.base.attr.max_wr = depth;
        init_attr.base.attr.max_sge = 16;
        // 0 disables the SRQ-limit event; the count of outstanding receives
        // cannot go negative.
        init_attr.base.attr.srq_limit = 0;
        init_attr.comp_mask = IBV_EXP_CREATE_SRQ_CQ | IBV_EXP_CREATE_SRQ_XRCD;

        // SAFETY: FFI.
        let srq = unsafe { ibv_exp_create_srq(ctx.as_raw(), &mut init_attr) };
        let Some(srq) = NonNull::new(srq) else {
            fatal(format_args!(
                "cannot create SRQ: {}",
                io::Error::last_os_error()
            ));
        };

        let mut num = 0;
        // SAFETY: FFI.
        if unsafe { ibv_get_srq_num(srq.as_ptr(), &mut num) } != 0 {
            fatal("cannot query SRQ number");
        }
        Self { srq, num }
    }
}

/// An RDMA extended-reliable-connected endpoint towards one remote peer.
///
/// The verb surface mirrors [`ReliableEndpoint`](super::rc::ReliableEndpoint)
/// with two differences: `send` takes the id of the destination SRQ on the
/// peer, and `recv` posts to this endpoint's shared receive queue rather
/// than a per-QP receive queue.
pub struct ExtendedEndpoint {
    node: usize,
    peer: usize,
    index: usize,

    ini_qp: OwnedQp,
    tgt_qp: OwnedQp,
    srq: OwnedSrq,
    send_cq: Cq,
    recv_cq: Cq,
    placeholder_cq: Cq,

    remote_mrs: RemoteMrTable,
    remote_srqs: [u32; MAX_CONNECTIONS],
    num_remote_srqs: usize,

    ctx: Context,
}

impl ExtendedEndpoint {
    /// Create an endpoint in the RESET state: three CQs, the XRC SRQ, and
    /// the initiator/target QP pair.
    pub(crate) fn new(ctx: &Context, node: usize, peer: usize, index: usize) -> Self {
        let send_cq = Cq::create(ctx, MAX_QUEUE_DEPTH);
        let recv_cq = Cq::create(ctx, MAX_QUEUE_DEPTH);
        let placeholder_cq = Cq::create(ctx, PLACEHOLDER_CQ_DEPTH);

        let srq = OwnedSrq::new(ctx, &recv_cq, MAX_QUEUE_DEPTH);

        let ini_qp = qp::create_qp(
            ctx,
            ibv_qp_type::IBV_QPT_XRC,
            &send_cq,
            &placeholder_cq,
            None,
            MAX_QUEUE_DEPTH,
        );
        let tgt_qp = qp::create_qp(
            ctx,
            ibv_qp_type::IBV_QPT_XRC_RECV,
            &placeholder_cq,
            &recv_cq,
            Some(srq.srq.as_ptr()),
            MAX_QUEUE_DEPTH,
        );

        Self {
            node,
            peer,
            index,
            ini_qp,
            tgt_qp,
            srq,
            send_cq,
            recv_cq,
            placeholder_cq,
            remote_mrs: RemoteMrTable::default(),
            remote_srqs: [0; MAX_CONNECTIONS],
            num_remote_srqs: 0,
            ctx: ctx.clone(),
        }
    }

    /// Record this endpoint's QP numbers and SRQ number into the outgoing
    /// exchange record.
    pub(crate) fn fill_exchange(&self, xchg: &mut OobExchange) {
        xchg.xrc_ini_qp_num[self.index] = self.ini_qp.qp_num();
        xchg.xrc_tgt_qp_num[self.index] = self.tgt_qp.qp_num();
        xchg.xrc_srq_num[self.index] = self.srq.num;
    }

    /// Drive both QPs through INIT → RTR → RTS. The initiator pairs with the
    /// remote target QP and the target with the remote initiator QP. Install
    /// the peer's MR table and SRQ numbers for subsequent posting.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn connect(
        &mut self,
        gid: Gid,
        lid: Lid,
        remote_ini_qpn: Qpn,
        remote_tgt_qpn: Qpn,
        remote_srqs: &[u32],
        mrs: RemoteMrTable,
    ) {
        self.remote_mrs = mrs;
        self.num_remote_srqs = remote_srqs.len().min(MAX_CONNECTIONS);
        self.remote_srqs[..self.num_remote_srqs]
            .copy_from_slice(&remote_srqs[..self.num_remote_srqs]);

        qp::modify_to_init(&self.ini_qp);
        qp::modify_to_init(&self.tgt_qp);
        qp::modify_to_rtr(&self.ini_qp, gid, lid, remote_tgt_qpn);
        qp::modify_to_rtr(&self.tgt_qp, gid, lid, remote_ini_qpn);
        qp::modify_to_rts(&self.ini_qp);
        qp::modify_to_rts(&self.tgt_qp);
    }

    /// The destination SRQ number every one-sided verb of this endpoint
    /// names. Verbs semantics require one even where no receive is consumed.
    #[inline]
    fn own_remote_srqn(&self) -> u32 {
        self.remote_srqs[self.index]
    }

    /// Get the send completion queue.
    #[inline]
    pub fn send_cq(&self) -> &Cq {
        &self.send_cq
    }

    /// Get the receive completion queue.
    #[inline]
    pub fn recv_cq(&self) -> &Cq {
        &self.recv_cq
    }

    /// Post a one-sided READ. See
    /// [`ReliableEndpoint::read`](super::rc::ReliableEndpoint::read).
    pub fn read(
        &self,
        dst: *mut u8,
        src: u64,
        len: usize,
        signaled: bool,
        wr_id: WrId,
    ) -> io::Result<()> {
        let mut sge = ibv_sge {
            addr: dst as u64,
            length: len as u32,
            lkey: self.ctx.match_local_lkey(dst as u64, len),
        };

        // SAFETY: POD type.
        let mut wr = unsafe { mem::zeroed::<ibv_exp_send_wr>() };
        wr.wr_id = wr_id;
        wr.sg_list = &mut sge;
        wr.num_sge = 1;
        wr.exp_opcode = ibv_exp_wr_opcode::IBV_EXP_WR_RDMA_READ;
        if signaled {
            wr.exp_send_flags = IBV_EXP_SEND_SIGNALED as u64;
        }
        wr.wr.rdma = rdma_t {
            remote_addr: src,
            rkey: self.remote_mrs.match_rkey(src, len),
        };
        wr.set_remote_srqn(self.own_remote_srqn());

        self.post_ini(&mut wr)
    }

    /// Post a one-sided WRITE. See
    /// [`ReliableEndpoint::write`](super::rc::ReliableEndpoint::write).
    pub fn write(
        &self,
        dst: u64,
        src: *const u8,
        len: usize,
        signaled: bool,
        wr_id: WrId,
    ) -> io::Result<()> {
        let mut sge = ibv_sge {
            addr: src as u64,
            length: len as u32,
            lkey: self.ctx.match_local_lkey(src as u64, len),
        };

        // SAFETY: POD type.
        let mut wr = unsafe { mem::zeroed::<ibv_exp_send_wr>() };
        wr.wr_id = wr_id;
        wr.sg_list = &mut sge;
        wr.num_sge = 1;
        wr.exp_opcode = ibv_exp_wr_opcode::IBV_EXP_WR_RDMA_WRITE;
        if signaled {
            wr.exp_send_flags = IBV_EXP_SEND_SIGNALED as u64;
        }
        wr.wr.rdma = rdma_t {
            remote_addr: dst,
            rkey: self.remote_mrs.match_rkey(dst, len),
        };
        wr.set_remote_srqn(self.own_remote_srqn());

        self.post_ini(&mut wr)
    }

    /// Post a two-sided SEND towards the `remote_id`-th SRQ of the peer.
    /// Consumes a receive posted on that SRQ.
    pub fn send(
        &self,
        src: *const u8,
        len: usize,
        remote_id: usize,
        signaled: bool,
        wr_id: WrId,
    ) -> io::Result<()> {
        if remote_id >= self.num_remote_srqs {
            fatal(format_args!("remote SRQ id {} out of range", remote_id));
        }

        let mut sge = ibv_sge {
            addr: src as u64,
            length: len as u32,
            lkey: self.ctx.match_local_lkey(src as u64, len),
        };

        // SAFETY: POD type.
        let mut wr = unsafe { mem::zeroed::<ibv_exp_send_wr>() };
        wr.wr_id = wr_id;
        wr.sg_list = &mut sge;
        wr.num_sge = 1;
        wr.exp_opcode = ibv_exp_wr_opcode::IBV_EXP_WR_SEND;
        if signaled {
            wr.exp_send_flags = IBV_EXP_SEND_SIGNALED as u64;
        }
        wr.set_remote_srqn(self.remote_srqs[remote_id]);

        self.post_ini(&mut wr)
    }

    /// Post a receive of at most `len` bytes to the shared receive queue.
    /// Any remote initiator targeting this SRQ may consume it.
    pub fn recv(&self, dst: *mut u8, len: usize, wr_id: WrId) -> io::Result<()> {
        let mut sge = ibv_sge {
            addr: dst as u64,
            length: len as u32,
            lkey: self.ctx.match_local_lkey(dst as u64, len),
        };

        // SAFETY: POD type.
        let mut wr = unsafe { mem::zeroed::<ibv_recv_wr>() };
        wr.wr_id = wr_id;
        wr.sg_list = &mut sge;
        wr.num_sge = 1;

        let ret = {
            let mut bad_wr = ptr::null_mut();
            // SAFETY: FFI; the WR chain is valid for the duration of the call.
            unsafe { ibv_post_srq_recv(self.srq.srq.as_ptr(), &mut wr, &mut bad_wr) }
        };
        from_c_ret(ret)
    }

    /// Post an 8-byte compare-and-swap. See
    /// [`ReliableEndpoint::atomic_cas`](super::rc::ReliableEndpoint::atomic_cas).
    pub fn atomic_cas(
        &self,
        dst: u64,
        compare: *mut u64,
        swap: u64,
        signaled: bool,
        wr_id: WrId,
    ) -> io::Result<()> {
        check_atomic_alignment(dst, "CAS");

        let mut sge = ibv_sge {
            addr: compare as u64,
            length: mem::size_of::<u64>() as u32,
            lkey: self
                .ctx
                .match_local_lkey(compare as u64, mem::size_of::<u64>()),
        };

        // SAFETY: POD type.
        let mut wr = unsafe { mem::zeroed::<ibv_exp_send_wr>() };
        wr.wr_id = wr_id;
        wr.sg_list = &mut sge;
        wr.num_sge = 1;
        wr.exp_opcode = ibv_exp_wr_opcode::IBV_EXP_WR_ATOMIC_CMP_AND_SWP;
        if signaled {
            wr.exp_send_flags = IBV_EXP_SEND_SIGNALED as u64;
        }
        wr.wr.atomic = atomic_t {
            remote_addr: dst,
            // SAFETY: caller passes a valid 8-byte buffer.
            compare_add: unsafe { *compare },
            swap,
            rkey: self.remote_mrs.match_rkey(dst, mem::size_of::<u64>()),
        };
        wr.set_remote_srqn(self.own_remote_srqn());

        self.post_ini(&mut wr)
    }

    /// Post an 8-byte fetch-and-add. See
    /// [`ReliableEndpoint::atomic_faa`](super::rc::ReliableEndpoint::atomic_faa).
    pub fn atomic_faa(
        &self,
        dst: u64,
        fetch: *mut u64,
        add: u64,
        signaled: bool,
        wr_id: WrId,
    ) -> io::Result<()> {
        check_atomic_alignment(dst, "FA");

        let mut sge = ibv_sge {
            addr: fetch as u64,
            length: mem::size_of::<u64>() as u32,
            lkey: self
                .ctx
                .match_local_lkey(fetch as u64, mem::size_of::<u64>()),
        };

        // SAFETY: POD type.
        let mut wr = unsafe { mem::zeroed::<ibv_exp_send_wr>() };
        wr.wr_id = wr_id;
        wr.sg_list = &mut sge;
        wr.num_sge = 1;
        wr.exp_opcode = ibv_exp_wr_opcode::IBV_EXP_WR_ATOMIC_FETCH_AND_ADD;
        if signaled {
            wr.exp_send_flags = IBV_EXP_SEND_SIGNALED as u64;
        }
        wr.wr.atomic = atomic_t {
            remote_addr: dst,
            compare_add: add,
            swap: 0,
            rkey: self.remote_mrs.match_rkey(dst, mem::size_of::<u64>()),
        };
        wr.set_remote_srqn(self.own_remote_srqn());

        self.post_ini(&mut wr)
    }

    /// Post a hardware-masked 8-byte compare-and-swap. See
    /// [`ReliableEndpoint::masked_cas`](super::rc::ReliableEndpoint::masked_cas).
    pub fn masked_cas(
        &self,
        dst: u64,
        compare: *mut u64,
        compare_mask: u64,
        swap: u64,
        swap_mask: u64,
        signaled: bool,
        wr_id: WrId,
    ) -> io::Result<()> {
        check_atomic_alignment(dst, "masked CAS");

        let mut sge = ibv_sge {
            addr: compare as u64,
            length: mem::size_of::<u64>() as u32,
            lkey: self
                .ctx
                .match_local_lkey(compare as u64, mem::size_of::<u64>()),
        };

        // SAFETY: POD type.
        let mut wr = unsafe { mem::zeroed::<ibv_exp_send_wr>() };
        wr.wr_id = wr_id;
        wr.sg_list = &mut sge;
        wr.num_sge = 1;
        wr.exp_opcode = ibv_exp_wr_opcode::IBV_EXP_WR_EXT_MASKED_ATOMIC_CMP_AND_SWP;
        wr.exp_send_flags = IBV_EXP_SEND_EXT_ATOMIC_INLINE as u64;
        if signaled {
            wr.exp_send_flags |= IBV_EXP_SEND_SIGNALED as u64;
        }

        wr.ext_op.masked_atomics = masked_atomics_t {
            log_arg_sz: 3, // log2(sizeof(u64))
            remote_addr: dst,
            rkey: self.remote_mrs.match_rkey(dst, mem::size_of::<u64>()),
            wr_data: wr_data_t {
                inline_data: inline_data_t {
                    op: inline_data_op_t {
                        cmp_swap: ibv_exp_cmp_swap {
                            // SAFETY: caller passes a valid 8-byte buffer.
                            compare_val: unsafe { *compare },
                            compare_mask,
                            swap_val: swap,
                            swap_mask,
                        },
                    },
                },
            },
        };
        wr.set_remote_srqn(self.own_remote_srqn());

        self.post_ini(&mut wr)
    }

    /// Post a masked fetch-and-add into a bitfield. See
    /// [`ReliableEndpoint::field_faa`](super::rc::ReliableEndpoint::field_faa).
    pub fn field_faa(
        &self,
        dst: u64,
        fetch: *mut u64,
        add: u64,
        highest_bit: u32,
        lowest_bit: u32,
        signaled: bool,
        wr_id: WrId,
    ) -> io::Result<()> {
        let (add_val, field_boundary) = super::rc::field_faa_operands(add, highest_bit, lowest_bit);
        self.masked_faa(dst, fetch, add_val, field_boundary, signaled, wr_id)
    }

    /// Post a masked fetch-and-add with an explicit boundary mask. See
    /// [`ReliableEndpoint::masked_faa`](super::rc::ReliableEndpoint::masked_faa).
    pub fn masked_faa(
        &self,
        dst: u64,
        fetch: *mut u64,
        add: u64,
        boundary: u64,
        signaled: bool,
        wr_id: WrId,
    ) -> io::Result<()> {
        check_atomic_alignment(dst, "masked FA");

        let mut sge = ibv_sge {
            addr: fetch as u64,
            length: mem::size_of::<u64>() as u32,
            lkey: self
                .ctx
                .match_local_lkey(fetch as u64, mem::size_of::<u64>()),
        };

        // SAFETY: POD type.
        let mut wr = unsafe { mem::zeroed::<ibv_exp_send_wr>() };
        wr.wr_id = wr_id;
        wr.sg_list = &mut sge;
        wr.num_sge = 1;
        wr.exp_opcode = ibv_exp_wr_opcode::IBV_EXP_WR_EXT_MASKED_ATOMIC_FETCH_AND_ADD;
        wr.exp_send_flags = IBV_EXP_SEND_EXT_ATOMIC_INLINE as u64;
        if signaled {
            wr.exp_send_flags |= IBV_EXP_SEND_SIGNALED as u64;
        }

        wr.ext_op.masked_atomics = masked_atomics_t {
            log_arg_sz: 3, // log2(sizeof(u64))
            remote_addr: dst,
            rkey: self.remote_mrs.match_rkey(dst, mem::size_of::<u64>()),
            wr_data: wr_data_t {
                inline_data: inline_data_t {
                    op: inline_data_op_t {
                        fetch_add: ibv_exp_fetch_add {
                            add_val: add,
                            field_boundary: boundary,
                        },
                    },
                },
            },
        };
        wr.set_remote_srqn(self.own_remote_srqn());

        self.post_ini(&mut wr)
    }

    /// Spin until exactly `n` send completions have been drained.
    pub fn poll_send(&self, n: usize) -> usize {
        self.send_cq.drain_blocking(n)
    }

    /// Spin until the given buffer is filled with send completions.
    pub fn poll_send_into(&self, wc: &mut [Wc]) -> usize {
        self.send_cq.drain_blocking_into(wc)
    }

    /// Poll send completions once, without blocking.
    pub fn poll_send_once(&self, wc: &mut [Wc]) -> usize {
        self.send_cq.drain_once_into(wc)
    }

    /// Spin until exactly `n` receive completions have been drained.
    pub fn poll_recv(&self, n: usize) -> usize {
        self.recv_cq.drain_blocking(n)
    }

    /// Spin until the given buffer is filled with receive completions.
    pub fn poll_recv_into(&self, wc: &mut [Wc]) -> usize {
        self.recv_cq.drain_blocking_into(wc)
    }

    /// Poll receive completions once, without blocking.
    pub fn poll_recv_once(&self, wc: &mut [Wc]) -> usize {
        self.recv_cq.drain_once_into(wc)
    }

    /// Report both QP states to standard error. Returns 0 when both are in
    /// RTS, nonzero otherwise.
    pub fn verbose(&self) -> i32 {
        let ini = self.ini_qp.state();
        let tgt = self.tgt_qp.state();
        eprintln!(
            "  [node {}, peer {}] xrc {}: ini {}, tgt {}",
            self.node,
            self.peer,
            self.index,
            ini.name(),
            tgt.name()
        );
        if ini != QpState::Rts || tgt != QpState::Rts {
            return -1;
        }
        0
    }

    #[inline]
    fn post_ini(&self, wr: &mut ibv_exp_send_wr) -> io::Result<()> {
        let ret = {
            let mut bad_wr = ptr::null_mut();
            // SAFETY: FFI; the WR chain is valid for the duration of the call.
            unsafe { ibv_exp_post_send(self.ini_qp.as_ptr(), wr, &mut bad_wr) }
        };
        from_c_ret(ret)
    }
}

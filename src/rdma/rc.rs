//! Reliable-connected endpoints.

use std::io;
use std::mem;
use std::ptr;

use super::context::Context;
use super::cq::Cq;
use super::gid::Gid;
use super::mr::RemoteMrTable;
use super::qp::{self, OwnedQp, QpState};
use super::types::*;
use super::wc::Wc;
use crate::bindings::*;
use crate::utils::fatal::fatal;
use crate::utils::interop::{from_c_err, from_c_ret};
use crate::utils::select::Select;

/// Kill the process if an atomic target is not 8-byte aligned.
#[inline]
pub(crate) fn check_atomic_alignment(dst: u64, what: &str) {
    if dst & 0x7 != 0 {
        fatal(format_args!("post atomic {} to non-aligned address", what));
    }
}

/// Derive the wire operands of a bitfield fetch-and-add: the addend shifted
/// into the field, and the carry boundary one past the field's top bit.
#[inline]
pub(crate) fn field_faa_operands(add: u64, highest_bit: u32, lowest_bit: u32) -> (u64, u64) {
    (add << lowest_bit, 1u64 << highest_bit)
}

/// An RDMA reliable-connected endpoint towards one remote peer.
///
/// Owns one RC queue pair and its two completion queues (which may be shared
/// with a sibling endpoint per the CQ-sharing policy), and exposes the
/// verb-posting surface.
///
/// Every posting method builds a single work request and hands it to the
/// device; `Ok(())` means enqueued, not completed. Unsignaled requests
/// produce no completion; a signaled request produces exactly one CQE
/// carrying the caller's `wr_id`. Within one endpoint, work requests
/// complete strictly in posting order.
pub struct ReliableEndpoint {
    node: usize,
    peer: usize,
    index: usize,

    qp: OwnedQp,
    send_cq: Cq,
    recv_cq: Cq,

    remote_mrs: RemoteMrTable,

    ctx: Context,
}

impl ReliableEndpoint {
    /// Create an endpoint with its own completion queues, in the RESET state.
    pub(crate) fn new(ctx: &Context, node: usize, peer: usize, index: usize) -> Self {
        let send_cq = Cq::create(ctx, MAX_QUEUE_DEPTH);
        let recv_cq = Cq::create(ctx, MAX_QUEUE_DEPTH);
        Self::with_cqs(ctx, node, peer, index, send_cq, recv_cq)
    }

    /// Create an endpoint reusing another endpoint's completion queues.
    pub(crate) fn with_cqs(
        ctx: &Context,
        node: usize,
        peer: usize,
        index: usize,
        send_cq: Cq,
        recv_cq: Cq,
    ) -> Self {
        let qp = qp::create_qp(
            ctx,
            ibv_qp_type::IBV_QPT_RC,
            &send_cq,
            &recv_cq,
            None,
            MAX_QUEUE_DEPTH,
        );
        Self {
            node,
            peer,
            index,
            qp,
            send_cq,
            recv_cq,
            remote_mrs: RemoteMrTable::default(),
            ctx: ctx.clone(),
        }
    }

    /// Record this endpoint's QP number into the outgoing exchange record.
    pub(crate) fn fill_exchange(&self, xchg: &mut super::exchange::OobExchange) {
        xchg.rc_qp_num[self.index] = self.qp.qp_num();
    }

    /// Drive the QP through INIT → RTR → RTS against the symmetric remote QP,
    /// and install the peer's advertised MR table for rkey matching.
    pub(crate) fn connect(&mut self, gid: Gid, lid: Lid, qpn: Qpn, mrs: RemoteMrTable) {
        self.remote_mrs = mrs;
        qp::modify_to_init(&self.qp);
        qp::modify_to_rtr(&self.qp, gid, lid, qpn);
        qp::modify_to_rts(&self.qp);
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

    /// Post a one-sided READ: asynchronous `memcpy(dst, src, len)` from
    /// remote to local memory.
    ///
    /// `dst` must lie in a locally registered MR and `src` in one of the
    /// peer's advertised MRs; a mismatch kills the process. Although this
    /// method takes no mutable borrow, completion of the READ writes `dst`.
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
        let mut wr = unsafe { mem::zeroed::<ibv_send_wr>() };
        wr.wr_id = wr_id;
        wr.sg_list = &mut sge;
        wr.num_sge = 1;
        wr.opcode = ibv_wr_opcode::IBV_WR_RDMA_READ;
        wr.send_flags = signaled.select(ibv_send_flags::IBV_SEND_SIGNALED.0, 0);
        wr.wr.rdma = rdma_t {
            remote_addr: src,
            rkey: self.remote_mrs.match_rkey(src, len),
        };

        self.post(&mut wr)
    }

    /// Post a one-sided WRITE: asynchronous `memcpy(dst, src, len)` from
    /// local to remote memory.
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
        let mut wr = unsafe { mem::zeroed::<ibv_send_wr>() };
        wr.wr_id = wr_id;
        wr.sg_list = &mut sge;
        wr.num_sge = 1;
        wr.opcode = ibv_wr_opcode::IBV_WR_RDMA_WRITE;
        wr.send_flags = signaled.select(ibv_send_flags::IBV_SEND_SIGNALED.0, 0);
        wr.wr.rdma = rdma_t {
            remote_addr: dst,
            rkey: self.remote_mrs.match_rkey(dst, len),
        };

        self.post(&mut wr)
    }

    /// Post a two-sided SEND. Consumes a posted receive at the peer.
    pub fn send(&self, src: *const u8, len: usize, signaled: bool, wr_id: WrId) -> io::Result<()> {
        let mut sge = ibv_sge {
            addr: src as u64,
            length: len as u32,
            lkey: self.ctx.match_local_lkey(src as u64, len),
        };

        // SAFETY: POD type.
        let mut wr = unsafe { mem::zeroed::<ibv_send_wr>() };
        wr.wr_id = wr_id;
        wr.sg_list = &mut sge;
        wr.num_sge = 1;
        wr.opcode = ibv_wr_opcode::IBV_WR_SEND;
        wr.send_flags = signaled.select(ibv_send_flags::IBV_SEND_SIGNALED.0, 0);

        self.post(&mut wr)
    }

    /// Post a receive of at most `len` bytes into `dst`.
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
            unsafe { ibv_post_recv(self.qp.as_ptr(), &mut wr, &mut bad_wr) }
        };
        from_c_ret(ret)
    }

    /// Post an 8-byte compare-and-swap against `dst`.
    ///
    /// `compare` both supplies the expected value and, once the request
    /// completes, holds the value the remote cell had before the operation
    /// (so on failure, the actual prior value lands there).
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
        let mut wr = unsafe { mem::zeroed::<ibv_send_wr>() };
        wr.wr_id = wr_id;
        wr.sg_list = &mut sge;
        wr.num_sge = 1;
        wr.opcode = ibv_wr_opcode::IBV_WR_ATOMIC_CMP_AND_SWP;
        wr.send_flags = signaled.select(ibv_send_flags::IBV_SEND_SIGNALED.0, 0);
        wr.wr.atomic = atomic_t {
            remote_addr: dst,
            // SAFETY: caller passes a valid 8-byte buffer.
            compare_add: unsafe { *compare },
            swap,
            rkey: self.remote_mrs.match_rkey(dst, mem::size_of::<u64>()),
        };

        self.post(&mut wr)
    }

    /// Post an 8-byte fetch-and-add against `dst`; the fetched prior value
    /// lands in `fetch` on completion.
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
        let mut wr = unsafe { mem::zeroed::<ibv_send_wr>() };
        wr.wr_id = wr_id;
        wr.sg_list = &mut sge;
        wr.num_sge = 1;
        wr.opcode = ibv_wr_opcode::IBV_WR_ATOMIC_FETCH_AND_ADD;
        wr.send_flags = signaled.select(ibv_send_flags::IBV_SEND_SIGNALED.0, 0);
        wr.wr.atomic = atomic_t {
            remote_addr: dst,
            compare_add: add,
            swap: 0,
            rkey: self.remote_mrs.match_rkey(dst, mem::size_of::<u64>()),
        };

        self.post(&mut wr)
    }

    /// Post a hardware-masked 8-byte compare-and-swap.
    ///
    /// Only bits selected by `compare_mask` participate in the comparison,
    /// and only bits selected by `swap_mask` are replaced.
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

        self.post_exp(&mut wr)
    }

    /// Post a masked fetch-and-add into the bitfield `[lowest_bit,
    /// highest_bit]` of the remote 8-byte cell. The addend is applied inside
    /// the field; do not shift it beforehand.
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
        let (add_val, field_boundary) = field_faa_operands(add, highest_bit, lowest_bit);
        self.masked_faa(dst, fetch, add_val, field_boundary, signaled, wr_id)
    }

    /// Post a masked fetch-and-add with an explicit per-field carry boundary
    /// mask: set bits mark the left boundary of each independent field.
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

        self.post_exp(&mut wr)
    }

    /// Post a CQE-WAIT work request: block this QP's send queue until `cqe`
    /// completions have arrived on the given CQ.
    pub fn cqe_wait(&self, cq: &Cq, cqe: i32, signaled: bool) -> io::Result<()> {
        // SAFETY: POD type.
        let mut wr = unsafe { mem::zeroed::<ibv_exp_send_wr>() };
        wr.exp_opcode = ibv_exp_wr_opcode::IBV_EXP_WR_CQE_WAIT;
        wr.exp_send_flags = IBV_EXP_SEND_WAIT_EN_LAST as u64;
        if signaled {
            wr.exp_send_flags |= IBV_EXP_SEND_SIGNALED as u64;
        }
        wr.task.cqe_wait = cqe_wait_t {
            cq: cq.as_raw(),
            cq_count: cqe,
        };

        self.post_exp(&mut wr)
    }

    /// Post a chain of up to [`MAX_POST_WR`] READs in one doorbell.
    /// Only the final request is signaled, carrying `wr_id_start + count - 1`.
    ///
    /// The caller is responsible for keeping the send queue from
    /// overflowing.
    pub fn batch_read(
        &self,
        dst: &[*mut u8],
        src: &[u64],
        len: &[usize],
        wr_id_start: WrId,
    ) -> io::Result<()> {
        let count = dst.len();
        if count == 0 || count > MAX_POST_WR || src.len() != count || len.len() != count {
            return from_c_err(libc::EINVAL);
        }

        let mut sge = [ibv_sge {
            addr: 0,
            length: 0,
            lkey: 0,
        }; MAX_POST_WR];
        // SAFETY: POD type.
        let mut wr = unsafe { mem::zeroed::<[ibv_send_wr; MAX_POST_WR]>() };

        for i in 0..count {
            sge[i] = ibv_sge {
                addr: dst[i] as u64,
                length: len[i] as u32,
                lkey: self.ctx.match_local_lkey(dst[i] as u64, len[i]),
            };
        }
        let base = wr.as_mut_ptr();
        for i in 0..count {
            // SAFETY: `base` addresses the `wr` array; only slot `i` is
            // borrowed at a time, and `next` stores raw sibling pointers.
            let w = unsafe { &mut *base.add(i) };
            w.next = if i + 1 == count {
                ptr::null_mut()
            } else {
                // SAFETY: `i + 1 < count <= MAX_POST_WR`.
                unsafe { base.add(i + 1) }
            };
            w.wr_id = wr_id_start + i as u64;
            w.sg_list = &mut sge[i];
            w.num_sge = 1;
            w.opcode = ibv_wr_opcode::IBV_WR_RDMA_READ;
            if i + 1 == count {
                w.send_flags = ibv_send_flags::IBV_SEND_SIGNALED.0;
            }
            w.wr.rdma = rdma_t {
                remote_addr: src[i],
                rkey: self.remote_mrs.match_rkey(src[i], len[i]),
            };
        }

        self.post(&mut wr[0])
    }

    /// Post a chain of up to [`MAX_POST_WR`] WRITEs in one doorbell.
    /// Only the final request is signaled, carrying `wr_id_start + count - 1`.
    pub fn batch_write(
        &self,
        dst: &[u64],
        src: &[*const u8],
        len: &[usize],
        wr_id_start: WrId,
    ) -> io::Result<()> {
        let count = dst.len();
        if count == 0 || count > MAX_POST_WR || src.len() != count || len.len() != count {
            return from_c_err(libc::EINVAL);
        }

        let mut sge = [ibv_sge {
            addr: 0,
            length: 0,
            lkey: 0,
        }; MAX_POST_WR];
        // SAFETY: POD type.
        let mut wr = unsafe { mem::zeroed::<[ibv_send_wr; MAX_POST_WR]>() };

        for i in 0..count {
            sge[i] = ibv_sge {
                addr: src[i] as u64,
                length: len[i] as u32,
                lkey: self.ctx.match_local_lkey(src[i] as u64, len[i]),
            };
        }
        let base = wr.as_mut_ptr();
        for i in 0..count {
            // SAFETY: see `batch_read`.
            let w = unsafe { &mut *base.add(i) };
            w.next = if i + 1 == count {
                ptr::null_mut()
            } else {
                // SAFETY: `i + 1 < count <= MAX_POST_WR`.
                unsafe { base.add(i + 1) }
            };
            w.wr_id = wr_id_start + i as u64;
            w.sg_list = &mut sge[i];
            w.num_sge = 1;
            w.opcode = ibv_wr_opcode::IBV_WR_RDMA_WRITE;
            if i + 1 == count {
                w.send_flags = ibv_send_flags::IBV_SEND_SIGNALED.0;
            }
            w.wr.rdma = rdma_t {
                remote_addr: dst[i],
                rkey: self.remote_mrs.match_rkey(dst[i], len[i]),
            };
        }

        self.post(&mut wr[0])
    }

    /// Post a chain of up to [`MAX_POST_WR`] masked fetch-and-adds in one
    /// doorbell. Only the final request is signaled.
    pub fn batch_masked_faa(
        &self,
        dst: &[u64],
        fetch: &[*mut u64],
        add: &[u64],
        boundary: &[u64],
        wr_id_start: WrId,
    ) -> io::Result<()> {
        let count = dst.len();
        if count == 0
            || count > MAX_POST_WR
            || fetch.len() != count
            || add.len() != count
            || boundary.len() != count
        {
            return from_c_err(libc::EINVAL);
        }

        let mut sge = [ibv_sge {
            addr: 0,
            length: 0,
            lkey: 0,
        }; MAX_POST_WR];
        // SAFETY: POD type.
        let mut wr = unsafe { mem::zeroed::<[ibv_exp_send_wr; MAX_POST_WR]>() };

        for i in 0..count {
            if (fetch[i] as u64) & 0x7 != 0 {
                fatal("post masked atomic FA to non-aligned local address");
            }
            sge[i] = ibv_sge {
                addr: fetch[i] as u64,
                length: mem::size_of::<u64>() as u32,
                lkey: self
                    .ctx
                    .match_local_lkey(fetch[i] as u64, mem::size_of::<u64>()),
            };
        }
        let base = wr.as_mut_ptr();
        for i in 0..count {
            check_atomic_alignment(dst[i], "masked FA");

            // SAFETY: see `batch_read`.
            let w = unsafe { &mut *base.add(i) };
            w.next = if i + 1 == count {
                ptr::null_mut()
            } else {
                // SAFETY: `i + 1 < count <= MAX_POST_WR`.
                unsafe { base.add(i + 1) }
            };
            w.wr_id = wr_id_start + i as u64;
            w.sg_list = &mut sge[i];
            w.num_sge = 1;
            w.exp_opcode = ibv_exp_wr_opcode::IBV_EXP_WR_EXT_MASKED_ATOMIC_FETCH_AND_ADD;
            w.exp_send_flags = IBV_EXP_SEND_EXT_ATOMIC_INLINE as u64;
            if i + 1 == count {
                w.exp_send_flags |= IBV_EXP_SEND_SIGNALED as u64;
            }

            w.ext_op.masked_atomics = masked_atomics_t {
                log_arg_sz: 3, // log2(sizeof(u64))
                remote_addr: dst[i],
                rkey: self.remote_mrs.match_rkey(dst[i], mem::size_of::<u64>()),
                wr_data: wr_data_t {
                    inline_data: inline_data_t {
                        op: inline_data_op_t {
                            fetch_add: ibv_exp_fetch_add {
                                add_val: add[i],
                                field_boundary: boundary[i],
                            },
                        },
                    },
                },
            };
        }

        self.post_exp(&mut wr[0])
    }

    /// Spin until exactly `n` send completions have been drained.
    /// A completion with non-success status kills the process.
    pub fn poll_send(&self, n: usize) -> usize {
        self.send_cq.drain_blocking(n)
    }

    /// Spin until the given buffer is filled with send completions.
    pub fn poll_send_into(&self, wc: &mut [Wc]) -> usize {
        self.send_cq.drain_blocking_into(wc)
    }

    /// Poll send completions once, without blocking. Returns how many were
    /// available (possibly zero).
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

    /// Report the QP state to standard error. Returns 0 when the endpoint is
    /// in RTS, nonzero otherwise.
    pub fn verbose(&self) -> i32 {
        let state = self.qp.state();
        eprintln!(
            "  [node {}, peer {}] rc {}: {}",
            self.node,
            self.peer,
            self.index,
            state.name()
        );
        if state != QpState::Rts {
            return -1;
        }
        0
    }

    #[inline]
    fn post(&self, wr: &mut ibv_send_wr) -> io::Result<()> {
        let ret = {
            let mut bad_wr = ptr::null_mut();
            // SAFETY: FFI; the WR chain is valid for the duration of the call.
            unsafe { ibv_post_send(self.qp.as_ptr(), wr, &mut bad_wr) }
        };
        from_c_ret(ret)
    }

    #[inline]
    fn post_exp(&self, wr: &mut ibv_exp_send_wr) -> io::Result<()> {
        let ret = {
            let mut bad_wr = ptr::null_mut();
            // SAFETY: FFI; the WR chain is valid for the duration of the call.
            unsafe { ibv_exp_post_send(self.qp.as_ptr(), wr, &mut bad_wr) }
        };
        from_c_ret(ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_faa_operands() {
        // Byte field at bits 8..15: add lands shifted into the field, and
        // the carry boundary sits at the field's top bit.
        let (add, boundary) = field_faa_operands(3, 15, 8);
        assert_eq!(add, 0x300);
        assert_eq!(boundary, 1 << 15);

        // Whole-word field.
        let (add, boundary) = field_faa_operands(1, 63, 0);
        assert_eq!(add, 1);
        assert_eq!(boundary, 1 << 63);
    }
}

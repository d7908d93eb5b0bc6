//! Remote peers.

use super::context::Context;
use super::exchange::OobExchange;
use super::gid::Gid;
use super::mr::{RemoteMr, RemoteMrTable};
use super::rc::ReliableEndpoint;
use super::types::*;
use super::xrc::ExtendedEndpoint;
use crate::utils::fatal::fatal;

/// A remote node this process holds RDMA connections with.
///
/// Owns the endpoint vectors of both kinds towards one remote rank, that
/// peer's advertised MR table, and its SRQ-number table.
pub struct Peer {
    node: usize,
    rank: usize,

    rcs: Vec<ReliableEndpoint>,
    xrcs: Vec<ExtendedEndpoint>,

    remote_mrs: RemoteMrTable,
    remote_srqs: [u32; MAX_CONNECTIONS],
    num_remote_srqs: usize,

    ctx: Context,
}

impl Peer {
    /// Create the peer and its endpoints. All queue pairs start in RESET;
    /// nothing touches the network until [`install_remote`](Self::install_remote).
    ///
    /// `share_cq_with` is the validated CQ-sharing policy for the RC kind:
    /// entry `i` holds `-1`/`i` for independent CQs or an earlier endpoint
    /// index whose CQs endpoint `i` reuses.
    pub(crate) fn new(
        ctx: &Context,
        node: usize,
        rank: usize,
        num_rc: usize,
        num_xrc: usize,
        share_cq_with: Option<&[i32]>,
    ) -> Self {
        let mut rcs = Vec::with_capacity(num_rc);
        for i in 0..num_rc {
            let share = share_cq_with.map_or(-1, |t| t[i]);
            let ep = if share < 0 || share as usize == i {
                ReliableEndpoint::new(ctx, node, rank, i)
            } else {
                let donor: &ReliableEndpoint = &rcs[share as usize];
                let send_cq = donor.send_cq().clone();
                let recv_cq = donor.recv_cq().clone();
                ReliableEndpoint::with_cqs(ctx, node, rank, i, send_cq, recv_cq)
            };
            rcs.push(ep);
        }

        let xrcs = (0..num_xrc)
            .map(|i| ExtendedEndpoint::new(ctx, node, rank, i))
            .collect();

        Self {
            node,
            rank,
            rcs,
            xrcs,
            remote_mrs: RemoteMrTable::default(),
            remote_srqs: [0; MAX_CONNECTIONS],
            num_remote_srqs: 0,
            ctx: ctx.clone(),
        }
    }

    /// Append this peer's endpoint QP numbers and SRQ numbers to the
    /// outgoing exchange record.
    pub(crate) fn fill_exchange(&self, xchg: &mut OobExchange) {
        xchg.num_rc = self.rcs.len() as i32;
        for ep in &self.rcs {
            ep.fill_exchange(xchg);
        }
        xchg.num_xrc = self.xrcs.len() as i32;
        for ep in &self.xrcs {
            ep.fill_exchange(xchg);
        }
    }

    /// Install the peer's advertised tables and drive every endpoint's
    /// QP(s) through INIT → RTR → RTS using the received metadata.
    pub(crate) fn install_remote(&mut self, xchg: &OobExchange) {
        let mut mrs = [RemoteMr::default(); MAX_MRS];
        let num_mr = (xchg.num_mr as usize).min(MAX_MRS);
        for i in 0..num_mr {
            mrs[i] = RemoteMr::new(xchg.mr[i].addr, xchg.mr[i].len as usize, xchg.mr[i].rkey);
        }
        self.remote_mrs.install(&mrs[..num_mr]);

        let gid = Gid::from(xchg.gid);
        let lid = xchg.lid;

        let num_xrc = (xchg.num_xrc as usize).min(MAX_CONNECTIONS);
        self.num_remote_srqs = num_xrc;
        self.remote_srqs[..num_xrc].copy_from_slice(&xchg.xrc_srq_num[..num_xrc]);

        // RC slots pair symmetrically: my i-th QP talks to the remote i-th.
        for (i, ep) in self.rcs.iter_mut().enumerate() {
            ep.connect(gid, lid, xchg.rc_qp_num[i], self.remote_mrs);
        }

        // XRC slots cross-pair: my initiator targets the remote target QP
        // and my target receives from the remote initiator.
        for (i, ep) in self.xrcs.iter_mut().enumerate() {
            ep.connect(
                gid,
                lid,
                xchg.xrc_ini_qp_num[i],
                xchg.xrc_tgt_qp_num[i],
                &self.remote_srqs[..num_xrc],
                self.remote_mrs,
            );
        }
    }

    /// The rank of this peer.
    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Address and length of the peer's `i`-th advertised memory region.
    #[inline]
    pub fn remote_mr(&self, i: usize) -> (u64, usize) {
        let mr = self.remote_mrs.get(i);
        (mr.addr, mr.len)
    }

    /// Number of memory regions the peer advertised.
    #[inline]
    pub fn num_remote_mrs(&self) -> usize {
        self.remote_mrs.len()
    }

    /// The peer's advertised SRQ numbers, one per XRC endpoint slot.
    #[inline]
    pub fn remote_srq_nums(&self) -> &[u32] {
        &self.remote_srqs[..self.num_remote_srqs]
    }

    /// Get the `i`-th reliable endpoint towards this peer.
    #[inline]
    pub fn rc(&self, i: usize) -> &ReliableEndpoint {
        match self.rcs.get(i) {
            Some(ep) => ep,
            None => fatal(format_args!("rc endpoint {} out of range", i)),
        }
    }

    /// Get the `i`-th reliable endpoint towards this peer.
    #[deprecated(note = "ambiguous since the introduction of XRC; use `rc()`")]
    #[inline]
    pub fn connection(&self, i: usize) -> &ReliableEndpoint {
        self.rc(i)
    }

    /// Get the `i`-th extended-reliable endpoint towards this peer.
    #[inline]
    pub fn xrc(&self, i: usize) -> &ExtendedEndpoint {
        match self.xrcs.get(i) {
            Some(ep) => ep,
            None => fatal(format_args!("xrc endpoint {} out of range", i)),
        }
    }

    /// Number of reliable endpoints towards this peer.
    #[inline]
    pub fn num_rc(&self) -> usize {
        self.rcs.len()
    }

    /// Number of extended-reliable endpoints towards this peer.
    #[inline]
    pub fn num_xrc(&self) -> usize {
        self.xrcs.len()
    }

    /// Match a remote address range to one of the peer's advertised MRs and
    /// return its rkey. A miss is a programmer error and kills the process.
    #[inline]
    pub fn match_remote_rkey(&self, addr: u64, size: usize) -> RKey {
        self.remote_mrs.match_rkey(addr, size)
    }

    /// Report every endpoint's QP state. Returns 0 when all are in RTS,
    /// or the first endpoint's nonzero report.
    pub(crate) fn verbose(&self) -> i32 {
        for ep in &self.rcs {
            let rc = ep.verbose();
            if rc != 0 {
                return rc;
            }
        }
        for ep in &self.xrcs {
            let rc = ep.verbose();
            if rc != 0 {
                return rc;
            }
        }
        0
    }

    /// The context this peer was created under.
    #[inline]
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// The rank of the local process, for diagnostics.
    #[allow(dead_code)]
    #[inline]
    pub(crate) fn node(&self) -> usize {
        self.node
    }
}

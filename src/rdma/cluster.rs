//! The cluster aggregate and its bring-up protocol.

use std::sync::atomic::{compiler_fence, AtomicBool, Ordering};

use super::context::Context;
use super::exchange::OobExchange;
use super::peer::Peer;
use super::types::*;
use crate::ctrl::Bootstrap;
use crate::utils::fatal::{fatal, set_node_id};

/// Validate a CQ-sharing policy table.
///
/// For `0 <= i < num_rc`, entry `i` must be `-1` or `i` (independent CQs) or
/// an earlier index in `[0, i)` whose CQs endpoint `i` reuses.
pub(crate) fn share_table_is_valid(table: &[i32], num_rc: usize) -> bool {
    table.len() == num_rc
        && table
            .iter()
            .enumerate()
            .all(|(i, &s)| s >= -1 && s <= i as i32)
}

/// The whole RDMA cluster: one fully-connected mesh of reliable endpoints.
///
/// Owns one [`Peer`] per remote rank and the bootstrap transport used for
/// out-of-band bring-up. Exchange over the transport happens only inside
/// [`establish`](Self::establish) and [`sync`](Self::sync).
pub struct Cluster {
    ctx: Context,
    boot: Box<dyn Bootstrap>,
    id: usize,
    n: usize,
    peers: Vec<Option<Peer>>,

    connected: AtomicBool,
}

impl Cluster {
    /// Create a cluster handle over an already-initialized bootstrap
    /// transport. Records this process's rank and the world size; no RDMA
    /// objects are created until [`establish`](Self::establish).
    pub fn new(ctx: &Context, boot: Box<dyn Bootstrap>) -> Self {
        let id = boot.rank();
        let n = boot.size();
        if n > MAX_PEERS {
            fatal(format_args!("cluster size {} exceeds {}", n, MAX_PEERS));
        }
        set_node_id(id);

        Self {
            ctx: ctx.clone(),
            boot,
            id,
            n,
            peers: Vec::new(),
            connected: AtomicBool::new(false),
        }
    }

    /// Synchronize among all peers and establish the full RC/XRC mesh.
    ///
    /// Runs at most once per cluster: the second and later calls return
    /// without touching any RDMA object. At least one of the connection
    /// counts must be positive.
    ///
    /// `share_cq_with` optionally lets RC endpoints within one peer pool
    /// completions: entry `i` may be `-1` or `i` for independent CQs, or an
    /// index in `[0, i)` to reuse that endpoint's CQs. Anything else is a
    /// programmer error and kills the process.
    pub fn establish(&mut self, num_rc: usize, num_xrc: usize, share_cq_with: Option<&[i32]>) {
        if self
            .connected
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        if num_rc + num_xrc == 0 {
            fatal("nothing to establish: zero connections of both kinds");
        }
        if num_rc > MAX_CONNECTIONS || num_xrc > MAX_CONNECTIONS {
            fatal(format_args!(
                "connection count exceeds {} per kind",
                MAX_CONNECTIONS
            ));
        }
        if let Some(table) = share_cq_with {
            if !share_table_is_valid(table, num_rc) {
                fatal("invalid CQ-sharing policy");
            }
        }

        // Create every peer's RDMA objects locally, all in RESET.
        self.peers = (0..self.n)
            .map(|i| {
                if i == self.id {
                    None
                } else {
                    Some(Peer::new(
                        &self.ctx,
                        self.id,
                        i,
                        num_rc,
                        num_xrc,
                        share_cq_with,
                    ))
                }
            })
            .collect();

        // All peers must have created their local objects before anyone
        // pairs QP numbers with them.
        if let Err(e) = self.boot.barrier() {
            fatal(format_args!("bootstrap barrier failed: {:#}", e));
        }

        // One zero-filled record per rank, self slot left zero.
        let mut my_info = vec![OobExchange::zeroed(); self.n];
        for (i, slot) in my_info.iter_mut().enumerate() {
            if i == self.id {
                continue;
            }
            self.ctx.fill_exchange(slot);
            self.peers[i].as_ref().unwrap().fill_exchange(slot);
        }

        let mut send = Vec::with_capacity(self.n * OobExchange::SIZE);
        for slot in &my_info {
            send.extend_from_slice(slot.as_bytes());
        }
        let mut recv = vec![0u8; self.n * OobExchange::SIZE];
        if let Err(e) = self.boot.alltoall(&send, &mut recv, OobExchange::SIZE) {
            fatal(format_args!("bootstrap all-to-all failed: {:#}", e));
        }

        // Pair every endpoint with the metadata the remote side sent us.
        for i in 0..self.n {
            if i == self.id {
                continue;
            }
            let remote = OobExchange::from_bytes(&recv[i * OobExchange::SIZE..]);
            self.peers[i].as_mut().unwrap().install_remote(&remote);
        }

        // The mesh is usable only after everyone reached RTS.
        if let Err(e) = self.boot.barrier() {
            fatal(format_args!("bootstrap barrier failed: {:#}", e));
        }
    }

    /// Synchronize among all peers.
    ///
    /// Besides the transport barrier, this inserts a compiler fence so that
    /// surrounding memory operations are not reordered across the
    /// synchronization point. This is a software-only fence; it implies
    /// nothing about RNIC-side consistency.
    pub fn sync(&self) {
        if let Err(e) = self.boot.barrier() {
            fatal(format_args!("failed to sync: {:#}", e));
        }
        compiler_fence(Ordering::SeqCst);
    }

    /// Get the rank of this node.
    #[inline]
    pub fn whoami(&self) -> usize {
        self.id
    }

    /// Get the size of the whole cluster.
    #[inline]
    pub fn size(&self) -> usize {
        self.n
    }

    /// Get the peer with the given rank. Asking for one's own rank is a
    /// programmer error and kills the process.
    #[inline]
    pub fn peer(&self, id: usize) -> &Peer {
        if id == self.id {
            fatal("cannot get the peer of myself");
        }
        match self.peers.get(id) {
            Some(Some(peer)) => peer,
            _ => fatal(format_args!("invalid peer id {}", id)),
        }
    }

    /// Locally walk every endpoint of every peer and report its QP state to
    /// standard error. Incurs no RDMA nor Ethernet traffic.
    ///
    /// Returns 0 when every endpoint is in RTS, or the first nonzero report.
    pub fn verbose(&self) -> i32 {
        eprintln!("[node {}] *** VERBOSE ***", self.id);
        for peer in self.peers.iter().flatten() {
            let rc = peer.verbose();
            if rc != 0 {
                eprintln!("[node {}] *** VERBOSE: halt, detected issue ***", self.id);
                return rc;
            }
        }
        0
    }

    /// The context this cluster was created under.
    #[inline]
    pub fn context(&self) -> &Context {
        &self.ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_share_table_validation() {
        // Independent CQs everywhere.
        assert!(share_table_is_valid(&[-1, -1, -1], 3));
        // Self-reference means independent too.
        assert!(share_table_is_valid(&[0, 1, 2], 3));
        // Reuse of an earlier endpoint's CQs.
        assert!(share_table_is_valid(&[-1, 0, 0], 3));
        assert!(share_table_is_valid(&[0, 0, 1], 3));

        // Forward references are invalid.
        assert!(!share_table_is_valid(&[1, 1, 2], 3));
        assert!(!share_table_is_valid(&[-1, 2, 0], 3));
        // Out-of-range entries are invalid.
        assert!(!share_table_is_valid(&[-2, 0, 0], 3));
        // Length must match the endpoint count.
        assert!(!share_table_is_valid(&[-1, -1], 3));
        assert!(!share_table_is_valid(&[], 1));
    }
}

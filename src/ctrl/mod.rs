//! Bootstrap transports for out-of-band bring-up.
//!
//! Cluster construction rides on an already-initialized collective runtime
//! providing rank, size, a barrier, and a fixed-size all-to-all byte
//! exchange. Two implementations ship with the crate: an MPI-backed one
//! (feature `mpi`) and a TCP one that needs no launcher beyond a shared
//! peer list.

mod topology;

mod tcp;

#[cfg(feature = "mpi")]
mod mpi;

use anyhow::Result;

pub use self::tcp::TcpBootstrap;
pub use self::topology::Topology;

#[cfg(feature = "mpi")]
pub use self::mpi::MpiBootstrap;

/// The collective surface cluster bring-up requires.
///
/// The transport must be initialized before a cluster is constructed and
/// stay usable until it is destroyed. All methods block the calling thread
/// for the duration of the collective.
pub trait Bootstrap: Send {
    /// The rank of this process in `[0, size)`.
    fn rank(&self) -> usize;

    /// The number of participating processes.
    fn size(&self) -> usize;

    /// Block until every process has entered the barrier.
    fn barrier(&self) -> Result<()>;

    /// Fixed-size all-to-all byte exchange.
    ///
    /// `send` and `recv` each hold `size()` chunks of exactly `chunk` bytes,
    /// one per rank (own slot included). After the call, `recv`'s `i`-th
    /// chunk holds the `rank()`-th chunk rank `i` sent.
    fn alltoall(&self, send: &[u8], recv: &mut [u8], chunk: usize) -> Result<()>;

    /// Pairwise exchange with one peer, for legacy bring-up paths.
    /// Both sides must pass equally sized buffers.
    fn sendrecv(&self, peer: usize, send: &[u8], recv: &mut [u8]) -> Result<()>;
}

use anyhow::{ensure, Result};
use mpi::collective::CommunicatorCollectives;
use mpi::environment::Universe;
use mpi::point_to_point::{Destination, Source};
use mpi::topology::{Communicator, SimpleCommunicator};

use super::Bootstrap;

/// A bootstrap transport over an MPI world communicator.
///
/// This is the configuration the library is primarily run under: one
/// process per rank, launched by `mpirun` or an equivalent.
pub struct MpiBootstrap {
    // Finalizes MPI when dropped; must outlive the communicator.
    _universe: Universe,
    world: SimpleCommunicator,
}

impl MpiBootstrap {
    /// Initialize MPI and wrap the world communicator.
    ///
    /// Returns `None` when MPI is already initialized; in that case the
    /// process owns its MPI lifecycle and should not route it through this
    /// type.
    pub fn init() -> Option<Self> {
        let universe = mpi::initialize()?;
        let world = universe.world();
        Some(Self {
            _universe: universe,
            world,
        })
    }
}

impl Bootstrap for MpiBootstrap {
    fn rank(&self) -> usize {
        self.world.rank() as usize
    }

    fn size(&self) -> usize {
        self.world.size() as usize
    }

    fn barrier(&self) -> Result<()> {
        self.world.barrier();
        Ok(())
    }

    fn alltoall(&self, send: &[u8], recv: &mut [u8], chunk: usize) -> Result<()> {
        let n = self.size();
        ensure!(
            send.len() == n * chunk && recv.len() == n * chunk,
            "all-to-all buffers must hold {} chunks of {} bytes",
            n,
            chunk
        );
        self.world.all_to_all_into(send, recv);
        Ok(())
    }

    fn sendrecv(&self, peer: usize, send: &[u8], recv: &mut [u8]) -> Result<()> {
        let me = self.rank();
        ensure!(peer != me, "cannot sendrecv with myself");

        // Rank-ordered send/receive avoids the rendezvous deadlock.
        let proc = self.world.process_at_rank(peer as i32);
        if me < peer {
            proc.send(send);
            proc.receive_into(recv);
        } else {
            proc.receive_into(recv);
            proc.send(send);
        }
        Ok(())
    }
}

use std::io::prelude::*;
use std::net::{Ipv4Addr, SocketAddrV4, TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use anyhow::{ensure, Context as _, Result};

use super::topology::Topology;
use super::Bootstrap;

/// Default first port of the range a TCP bootstrap occupies.
pub const DEFAULT_PORT: u16 = 13373;

fn stream_write(stream: &mut TcpStream, buf: &[u8]) -> Result<()> {
    stream.write_all(&(buf.len() as u64).to_le_bytes())?;
    stream.write_all(buf)?;
    Ok(())
}

fn stream_read(stream: &mut TcpStream, buf: &mut [u8]) -> Result<()> {
    let mut len = [0u8; 8];
    stream.read_exact(&mut len)?;
    let len = u64::from_le_bytes(len) as usize;
    ensure!(
        len == buf.len(),
        "peer sent {} bytes where {} were expected",
        len,
        buf.len()
    );
    stream.read_exact(buf)?;
    Ok(())
}

/// Connect to a peer, retrying until its listener is up.
fn connect_retrying(addr: SocketAddrV4) -> TcpStream {
    loop {
        if let Ok(stream) = TcpStream::connect(addr) {
            return stream;
        }
        thread::sleep(Duration::from_millis(100));
    }
}

fn pow2_roundup(x: usize) -> usize {
    let mut n = 1;
    while n < x {
        n *= 2;
    }
    n
}

/// A bootstrap transport over plain TCP.
///
/// Needs nothing but a shared peer list: no MPI launcher. Occupies two
/// ports on every host, `port_base` for the barrier and `port_base + 1` for
/// pairwise exchanges.
///
/// ## Synchronization scheme
///
/// The rank-0 process listens on the barrier port; all other processes
/// connect to it. Once rank 0 has received every connection, it sends one
/// byte to each to let them proceed. The all-to-all runs in log-rounds: in
/// round `step`, rank `x` exchanges with rank `x ^ step`, with a barrier
/// between rounds so every host's exchange port is free again.
pub struct TcpBootstrap {
    topo: Topology,
    port_base: u16,
}

impl TcpBootstrap {
    /// Create a bootstrap over the given topology and port range.
    pub fn new_on_port(topo: Topology, port_base: u16) -> Self {
        Self { topo, port_base }
    }

    /// Create a bootstrap over the given topology on the default ports.
    pub fn new(topo: Topology) -> Self {
        Self::new_on_port(topo, DEFAULT_PORT)
    }

    fn exchange_port(&self) -> u16 {
        self.port_base + 1
    }

    /// Pairwise blocking exchange with `peer` on the given port. The
    /// lower-ranked side connects, the higher-ranked side accepts.
    fn pair_exchange(&self, peer: usize, port: u16, send: &[u8], recv: &mut [u8]) -> Result<()> {
        let id = self.topo.rank();
        assert_ne!(id, peer);

        if id < peer {
            let addr = SocketAddrV4::new(self.topo.get(peer).unwrap(), port);
            let mut stream = connect_retrying(addr);
            // First receive, then send; mirrored on the other side.
            stream_read(&mut stream, recv)?;
            stream_write(&mut stream, send)?;
        } else {
            let inaddr_any = SocketAddrV4::new(Ipv4Addr::new(0, 0, 0, 0), port);
            let listener = TcpListener::bind(inaddr_any)
                .with_context(|| format!("cannot listen on port {}", port))?;
            let mut stream = listener.accept()?.0;
            stream_write(&mut stream, send)?;
            stream_read(&mut stream, recv)?;
        }
        Ok(())
    }
}

impl Bootstrap for TcpBootstrap {
    fn rank(&self) -> usize {
        self.topo.rank()
    }

    fn size(&self) -> usize {
        self.topo.size()
    }

    fn barrier(&self) -> Result<()> {
        let port = self.port_base;
        if self.topo.rank() == 0 {
            let inaddr_any = SocketAddrV4::new(Ipv4Addr::new(0, 0, 0, 0), port);
            let listener = TcpListener::bind(inaddr_any)
                .with_context(|| format!("cannot listen on port {}", port))?;

            let mut streams = Vec::new();
            for _ in 1..self.topo.size() {
                streams.push(listener.accept()?.0);
            }

            let buf = [0u8; 1];
            for mut stream in streams {
                stream.write_all(&buf)?;
            }
        } else {
            let server_addr = SocketAddrV4::new(self.topo.get(0).unwrap(), port);
            let mut stream = connect_retrying(server_addr);

            let mut buf = [0u8; 1];
            stream.read_exact(&mut buf)?;
        }
        Ok(())
    }

    fn alltoall(&self, send: &[u8], recv: &mut [u8], chunk: usize) -> Result<()> {
        let n = self.topo.size();
        let id = self.topo.rank();
        ensure!(
            send.len() == n * chunk && recv.len() == n * chunk,
            "all-to-all buffers must hold {} chunks of {} bytes",
            n,
            chunk
        );

        // Own slot is a local copy.
        recv[id * chunk..(id + 1) * chunk].copy_from_slice(&send[id * chunk..(id + 1) * chunk]);

        for step in 1..pow2_roundup(n) {
            let partner = id ^ step;
            if partner < n {
                // Split without overlapping borrows of `recv`.
                let recv_chunk = &mut recv[partner * chunk..(partner + 1) * chunk];
                let send_chunk = &send[partner * chunk..(partner + 1) * chunk];
                self.pair_exchange(partner, self.exchange_port(), send_chunk, recv_chunk)?;
            }
            // Round separation keeps every host's exchange port free.
            self.barrier()?;
        }
        Ok(())
    }

    fn sendrecv(&self, peer: usize, send: &[u8], recv: &mut [u8]) -> Result<()> {
        self.pair_exchange(peer, self.exchange_port(), send, recv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_pair(port_base: u16) -> (TcpBootstrap, TcpBootstrap) {
        let peers: Vec<Ipv4Addr> = vec!["127.0.0.1".parse().unwrap(); 2];
        let t0 = Topology::new_with_id(peers.clone(), 0);
        let t1 = Topology::new_with_id(peers, 1);
        (
            TcpBootstrap::new_on_port(t0, port_base),
            TcpBootstrap::new_on_port(t1, port_base),
        )
    }

    #[test]
    fn test_barrier_two_ranks() {
        let (b0, b1) = loopback_pair(24300);
        let h = thread::spawn(move || b1.barrier().unwrap());
        b0.barrier().unwrap();
        h.join().unwrap();
    }

    #[test]
    fn test_sendrecv_two_ranks() {
        let (b0, b1) = loopback_pair(24310);
        let h = thread::spawn(move || {
            let mut got = [0u8; 4];
            b1.sendrecv(0, b"pong", &mut got).unwrap();
            assert_eq!(&got, b"ping");
        });
        let mut got = [0u8; 4];
        b0.sendrecv(1, b"ping", &mut got).unwrap();
        assert_eq!(&got, b"pong");
        h.join().unwrap();
    }

    #[test]
    fn test_alltoall_two_ranks() {
        let (b0, b1) = loopback_pair(24320);
        const CHUNK: usize = 8;

        let h = thread::spawn(move || {
            let send: Vec<u8> = (0..2 * CHUNK as u8).map(|x| x + 100).collect();
            let mut recv = vec![0u8; 2 * CHUNK];
            b1.alltoall(&send, &mut recv, CHUNK).unwrap();
            recv
        });

        let send: Vec<u8> = (0..2 * CHUNK as u8).collect();
        let mut recv = vec![0u8; 2 * CHUNK];
        b0.alltoall(&send, &mut recv, CHUNK).unwrap();

        let recv1 = h.join().unwrap();
        // Rank 0 keeps its own chunk 0 and receives rank 1's chunk 0.
        assert_eq!(&recv[..CHUNK], &(0..CHUNK as u8).collect::<Vec<_>>()[..]);
        assert_eq!(
            &recv[CHUNK..],
            &(0..CHUNK as u8).map(|x| x + 100).collect::<Vec<_>>()[..]
        );
        // Rank 1 receives rank 0's chunk 1 and keeps its own chunk 1.
        assert_eq!(
            &recv1[..CHUNK],
            &(CHUNK as u8..2 * CHUNK as u8).collect::<Vec<_>>()[..]
        );
        assert_eq!(
            &recv1[CHUNK..],
            &(CHUNK as u8..2 * CHUNK as u8)
                .map(|x| x + 100)
                .collect::<Vec<_>>()[..]
        );
    }
}

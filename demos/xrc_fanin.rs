//! XRC fan-in: every non-zero rank sends its rank number to rank 0's
//! shared receive queue; rank 0 pre-posts the receives, drains one
//! completion per sender, and checks that the received set is exactly
//! `{1, …, n-1}`.
//!
//! Requires at least 3 hosts to be interesting.

use anyhow::Result;
use rdmesh::prelude::*;

fn main() -> Result<()> {
    env_logger::try_init().ok();

    let topo_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "topology.toml".to_owned());
    let topo = Topology::load_toml_file(topo_path)?;
    let boot = TcpBootstrap::new(topo);

    let ctx = Context::open(None)?;
    let mut buf = RegisteredMem::new(&ctx, 4096)?;
    buf.as_mut_slice().fill(0);

    let mut cluster = Cluster::new(&ctx, Box::new(boot));
    cluster.establish(0, 1, None);

    let id = cluster.whoami();
    let n = cluster.size();

    if id == 0 {
        // Rank `r` targets the SRQ advertised in rank 0's peer-`r` endpoint
        // slot, so pre-post one receive on each peer's endpoint.
        let mut slot = 0;
        for r in 1..n {
            cluster.peer(r).xrc(0).recv(
                // SAFETY: 8-byte slots of the registered buffer.
                unsafe { buf.as_mut_ptr().add(slot * 8) },
                8,
                slot as u64,
            )?;
            slot += 1;
        }

        cluster.sync();

        let mut wc = [Wc::default(); 1];
        for r in 1..n {
            cluster.peer(r).xrc(0).poll_recv_into(&mut wc);
        }

        let mut seen = vec![false; n];
        for i in 0..n - 1 {
            // SAFETY: the completed receives filled these 8-byte slots.
            let rank = unsafe { *(buf.as_ptr().add(i * 8) as *const u64) } as usize;
            assert!(rank >= 1 && rank < n, "bogus rank {} received", rank);
            assert!(!seen[rank], "rank {} received twice", rank);
            seen[rank] = true;
        }
        println!("0: received from all of 1..{}", n);
    } else {
        let my_rank = id as u64;
        buf.as_mut_slice()[..8].copy_from_slice(&my_rank.to_ne_bytes());

        cluster.sync();

        let xrc = cluster.peer(0).xrc(0);
        xrc.send(buf.as_ptr(), 8, 0, true, 0)?;
        xrc.poll_send(1);
        println!("{}: sent", id);
    }

    cluster.sync();
    Ok(())
}

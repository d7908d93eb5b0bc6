//! CAS ordering: a client hammers one remote 8-byte cell with batches of
//! compare-and-swaps carrying strictly increasing swap values, and checks
//! that the fetched prior values come back in exact posting order.
//!
//! Requires exactly 2 hosts: rank 0 is the client, rank 1 the server.

use std::time::Instant;

use anyhow::Result;
use rdmesh::prelude::*;

const CLIENT: usize = 0;
const SERVER: usize = 1;
const MEM_SIZE: usize = 1 << 20;

const NTESTS: usize = 100_000;
const BATCH: usize = 64;

fn main() -> Result<()> {
    env_logger::try_init().ok();

    let topo_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "topology.toml".to_owned());
    let topo = Topology::load_toml_file(topo_path)?;
    let boot = TcpBootstrap::new(topo);

    let ctx = Context::open(None)?;
    let mut buf = RegisteredMem::new(&ctx, MEM_SIZE)?;
    buf.as_mut_slice().fill(0);

    let mut cluster = Cluster::new(&ctx, Box::new(boot));
    cluster.establish(1, 0, None);

    let id = cluster.whoami();
    if cluster.size() != 2 {
        eprintln!("error: cas_ordering must run with only 2 hosts");
        std::process::exit(-1);
    }

    if id == CLIENT {
        let svr = cluster.peer(SERVER);
        let (dst, _len) = svr.remote_mr(0);
        let rc = svr.rc(0);

        let local = buf.as_mut_ptr() as *mut u64;
        let mut cur: u64 = 0;
        let mut check: u64 = 0;

        let exp_start = Instant::now();
        for i in 0..=NTESTS {
            // Post one batch; only its last CAS is signaled.
            if i < NTESTS {
                let offset = (i % 2) * BATCH;
                for j in 0..BATCH {
                    // SAFETY: `local` addresses MEM_SIZE zeroed bytes.
                    unsafe { *local.add(offset + j) = cur };
                    cur += 1;
                    rc.atomic_cas(
                        dst,
                        // SAFETY: in-bounds slot of the registered buffer.
                        unsafe { local.add(offset + j) },
                        cur,
                        j + 1 == BATCH,
                        j as u64,
                    )?;
                }
            }

            // Drain the previous batch and verify its fetched values.
            if i > 0 {
                rc.poll_send(1);

                let offset = (1 - (i % 2)) * BATCH;
                for j in 0..BATCH {
                    // SAFETY: in-bounds slot of the registered buffer.
                    let got = unsafe { *local.add(offset + j) };
                    if got != check {
                        eprintln!("order check failed (expected {}, get {})", check, got);
                    }
                    check += 1;
                }
            }
        }
        let micros = exp_start.elapsed().as_micros() as f64;
        eprintln!(
            "cas: {:.3} op per sec",
            (NTESTS * BATCH) as f64 / (micros / 1e6)
        );
    }

    cluster.sync();
    Ok(())
}

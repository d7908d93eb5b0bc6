//! Hello ring: every rank writes a greeting into the next rank's buffer,
//! then reads its own buffer to see who greeted it.
//!
//! Run one process per host listed in the topology file:
//!
//! ```text
//! cargo run --example hello -- topology.toml
//! ```

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
    let mut buf = RegisteredMem::new(&ctx, 1024)?;

    let mut cluster = Cluster::new(&ctx, Box::new(boot));
    cluster.establish(1, 0, None);

    // Send to next.
    let id = cluster.whoami();
    let n = cluster.size();
    let next_id = (id + 1) % n;

    let next = cluster.peer(next_id);
    let (dst, _dst_size) = next.remote_mr(0);
    let conn = next.rc(0);

    let msg = format!("hello from {}", id);
    buf.as_mut_slice()[..msg.len()].copy_from_slice(msg.as_bytes());

    conn.write(dst + 64, buf.as_ptr(), msg.len(), true, 0)?;
    conn.poll_send(1);

    cluster.sync();

    // Print what I got.
    let got = &buf.as_slice()[64..64 + msg.len()];
    println!("{}: {}", id, String::from_utf8_lossy(got));

    Ok(())
}

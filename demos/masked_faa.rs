//! Masked FAA bitfield: rank 0 adds 3 into the byte at bits 8..15 of a
//! zeroed 8-byte cell on rank 1, then reads the cell back and expects
//! `0x0000_0000_0000_0300`.
//!
//! Requires exactly 2 hosts.

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
    cluster.establish(1, 0, None);

    let id = cluster.whoami();
    if cluster.size() != 2 {
        eprintln!("error: masked_faa must run with only 2 hosts");
        std::process::exit(-1);
    }

    if id == 0 {
        let peer = cluster.peer(1);
        let (dst, _len) = peer.remote_mr(0);
        let rc = peer.rc(0);

        let fetch = buf.as_mut_ptr() as *mut u64;
        rc.field_faa(dst, fetch, 3, 15, 8, true, 0)?;
        rc.poll_send(1);

        // SAFETY: the completed FAA filled the first 8 bytes.
        let fetched = unsafe { *fetch };
        assert_eq!(fetched, 0, "prior value should be zero");

        // SAFETY: 8-byte slot of the registered buffer.
        let readback = unsafe { buf.as_mut_ptr().add(8) };
        rc.read(readback, dst, 8, true, 1)?;
        rc.poll_send(1);

        // SAFETY: the completed READ filled this slot.
        let cell = unsafe { *(readback as *const u64) };
        assert_eq!(cell, 0x0000_0000_0000_0300);
        println!("0: field faa ok, cell = {:#018x}", cell);
    }

    cluster.sync();
    Ok(())
}

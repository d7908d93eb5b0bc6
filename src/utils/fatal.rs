use std::fmt;
use std::process;
use std::sync::atomic::{AtomicI32, Ordering};

/// The rank of this process, published when a cluster is constructed.
/// `-1` until then; fatal messages print `?` in that window.
static NODE_ID: AtomicI32 = AtomicI32::new(-1);

/// Publish the local rank for fatal-error reporting.
pub(crate) fn set_node_id(id: usize) {
    NODE_ID.store(id as i32, Ordering::Relaxed);
}

/// Get the published local rank, if any.
pub(crate) fn node_id() -> Option<usize> {
    match NODE_ID.load(Ordering::Relaxed) {
        id if id >= 0 => Some(id as usize),
        _ => None,
    }
}

/// Report an unrecoverable error and terminate the process.
///
/// The message goes to standard error as `[node <rank>] <message>`.
pub(crate) fn fatal(msg: impl fmt::Display) -> ! {
    match node_id() {
        Some(id) => eprintln!("[node {}] {}", id, msg),
        None => eprintln!("[node ?] {}", msg),
    }
    process::abort()
}

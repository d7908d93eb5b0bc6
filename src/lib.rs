//! Turn a set of processes on RDMA-capable machines into a fully-connected
//! mesh of reliable endpoints, and expose the verbs surface (one-sided
//! READ/WRITE, two-sided SEND/RECV, and 64-bit remote atomics including
//! hardware-masked variants) as a small, typed object model.
//!
//! The object model is [`Context`] → [`Cluster`] → [`Peer`] →
//! [`ReliableEndpoint`] / [`ExtendedEndpoint`]. A context owns one opened
//! RNIC, its protection domains, and a small registered-MR table; a cluster
//! runs the bring-up protocol over an out-of-band [`ctrl::Bootstrap`]
//! transport, after which every pair of ranks is connected by the requested
//! number of RC and XRC endpoints, all in RTS. On top of the endpoint
//! surface, [`wrap::RemotePtr`] gives pointer-like ergonomics over a
//! remotely registered object with explicit commit/invalidate semantics.
//!
//! Posting verbs never blocks and never aborts on transport conditions: a
//! nonzero driver return surfaces as an `Err` and the work request counts
//! as not enqueued. Misuse (unregistered addresses, unaligned atomics,
//! invalid peer ids) and failed completions are unrecoverable and terminate
//! the process with a `[node <rank>] <message>` line on standard error.
//!
//! Requires a legacy MLNX_OFED v4.x verbs installation: the masked-atomics
//! and XRC paths go through the experimental (`ibv_exp_*`) surface.

#[cfg(not(target_os = "linux"))]
compile_error!("`rdmesh` currently only supports Linux");

/// C bindings.
mod bindings;

/// Shared util functions.
mod utils;

/// RDMA data-plane and bring-up functionalities.
/// Not to be publicly exposed, instead `pub use` necessary items.
mod rdma;

pub use rdma::cluster::Cluster;
pub use rdma::context::{Context, ContextError};
pub use rdma::cq::Cq;
pub use rdma::exchange::{MrXchg, OobExchange};
pub use rdma::gid::Gid;
pub use rdma::mr::{Permission, RemoteMr};
pub use rdma::peer::Peer;
pub use rdma::qp::QpState;
pub use rdma::rc::ReliableEndpoint;
pub use rdma::wc::{Wc, WcOpcode, WcStatus};
pub use rdma::xrc::ExtendedEndpoint;

/// Type aliases and capacity constants.
pub use rdma::types;

/// Bootstrap transports for out-of-band bring-up.
pub mod ctrl;

/// Higher-level wrappings of the endpoint surface.
pub mod wrap;

/// The RDMA prelude.
pub mod prelude;

//! The RDMA prelude.
//!
//! The purpose of this module is to alleviate imports of common
//! functionalities.

pub use crate::ctrl::{Bootstrap, TcpBootstrap, Topology};
pub use crate::types::*;
pub use crate::wrap::{RegisteredMem, RemotePtr};
pub use crate::{
    Cluster, Context, ContextError, ExtendedEndpoint, Gid, Peer, Permission, QpState,
    ReliableEndpoint, RemoteMr, Wc, WcOpcode, WcStatus,
};

#[cfg(feature = "mpi")]
pub use crate::ctrl::MpiBootstrap;

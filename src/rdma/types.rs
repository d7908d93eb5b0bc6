//! Type aliases and capacity constants for RDMA-related operations.

/// Port number is a [`u8`] that identifies a port on a local switch or an HCA.
pub type PortNum = u8;

/// Local identifier (LID) is a [`u16`] that identifies a port on a switch or an HCA in the cluster.
pub type Lid = u16;

/// QP number (QPN) is a [`u32`] that identifies a local queue pair.
pub type Qpn = u32;

/// Packet sequence number (PSN) is a [`u32`] that identifies a packet in a flow.
pub type Psn = u32;

/// Local key (LKey) is a [`u32`] that identifies a local memory region.
pub type LKey = u32;

/// Remote key (RKey) is a [`u32`] that identifies a remote memory region.
pub type RKey = u32;

/// Work request identifier (WrId) is a [`u64`] that can be designated by the user to identify a work request.
pub type WrId = u64;

/// Immediate data (ImmData) is a [`u32`] that can be carried in RDMA send-type work requests.
pub type ImmData = u32;

/// Maximum number of allowed memory regions per `Context`.
pub const MAX_MRS: usize = 4;

/// Maximum number of allowed peers (including myself) per `Cluster`.
pub const MAX_PEERS: usize = 256;

/// Maximum number of allowed connections between any pair of peers of any
/// connection kind. Drives the layout of the out-of-band exchange record.
pub const MAX_CONNECTIONS: usize = 32;

/// Maximum number of work requests in one chained batch post.
pub const MAX_POST_WR: usize = 32;

/// Send/receive queue and completion queue depth of every endpoint.
pub const MAX_QUEUE_DEPTH: u32 = 256;

/// Re-export of the raw verbs bindings, for users that need to reach the
/// underlying objects.
pub mod sys {
    pub use crate::bindings::*;
}


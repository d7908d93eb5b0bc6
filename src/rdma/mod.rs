// Device contexts.
pub mod context;

// Completion queues and work completions.
pub mod cq;
pub mod wc;

// Device GIDs.
pub mod gid;

// Memory regions, local and remote.
pub mod mr;

// Queue pair plumbing shared by both endpoint kinds.
pub mod qp;

// Out-of-band bring-up exchange records.
pub mod exchange;

// Reliable-connected endpoints.
pub mod rc;

// Extended-reliable-connected endpoints.
pub mod xrc;

// Remote peers.
pub mod peer;

// The cluster aggregate and its bring-up protocol.
pub mod cluster;

// Related types and capacity constants.
pub mod types;

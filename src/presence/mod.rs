//! Presence & Liveness Module
//!
//! Every peer advertises itself as a lease-bound record (`/peers/<id>` = address) in the
//! coordination backend. The record stays visible only while its lease keeps being
//! renewed, so absence is the sole liveness signal; there is no explicit deregistration.
//!
//! ## Core Mechanisms
//! - **Heartbeat**: A background task consumes keep-alive acknowledgements for the lease.
//! - **Re-registration**: When the acknowledgement stream closes (backend restart, partition,
//!   lost lease) the task grants a new lease and rewrites the record, retrying with bounded
//!   exponential backoff.
//! - **Surfaced failure**: If every attempt fails the heartbeat enters `Failed`, which the
//!   owning session observes; renewal never stops silently while the peer keeps serving.

pub mod service;
pub mod types;

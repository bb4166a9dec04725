//! File Location Index Module
//!
//! A cluster-wide, set-valued mapping from filename to the addresses of peers believed to
//! hold a copy.
//!
//! ## Semantics
//! - **Append-only**: Holders are added, never pruned; entries go stale when peers leave.
//! - **Set semantics**: Recording the same holder twice is a no-op.
//! - **Empty is not an error**: An unknown filename has an empty holder set. Only backend
//!   unavailability is reported as a failure.
//!
//! Holders are always peer network addresses (`ip:port`), for uploads, write-backs after
//! a fetch and discovery alike.

pub mod backend;
pub mod memory;
pub mod service;

#[cfg(feature = "redis")]
pub mod redis;

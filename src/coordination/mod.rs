//! Coordination Backend Module
//!
//! Abstracts the lease-capable key-value store that peers use to advertise presence.
//!
//! ## Capabilities
//! - **Leases**: Time-bounded claims that expire unless kept alive.
//! - **Lease-bound writes**: Keys that disappear together with their lease.
//! - **Keep-alive streams**: A stream of renewal acknowledgements; a closed stream means the
//!   lease can no longer be renewed (backend restart, partition, expiry).
//! - **Prefix enumeration**: Snapshot of all live keys under a namespace.
//!
//! `MemoryCoordinator` serves single-process clusters and tests; `EtcdCoordinator`
//! (feature `etcd`) talks to a real etcd cluster.

pub mod backend;
pub mod memory;
pub mod renewal;
pub mod types;

#[cfg(feature = "etcd")]
pub mod etcd;

#[cfg(test)]
mod tests;

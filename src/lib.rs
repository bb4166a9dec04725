//! Peer-to-Peer File Storage Overlay Library
//!
//! This library crate defines the modules that make up a peer. It serves as the
//! foundation for the binary executable (`main.rs`).
//!
//! ## Architecture Modules
//!
//! - **`coordination`**: Lease-based key/value backend (in-memory or etcd) used for
//!   presence records.
//! - **`presence`**: Lease-bound peer registration with a background heartbeat that
//!   re-registers after lease loss and surfaces terminal failure.
//! - **`index`**: Shared filename → holder-address index over a set store (in-memory or
//!   Redis).
//! - **`storage`**: Per-peer on-disk file cache with atomic writes.
//! - **`api`**: HTTP surface of a peer, including fetch-on-miss replication.
//! - **`session`**: Lifecycle of one peer, from binding to graceful shutdown.
//! - **`config`**: Command-line and environment configuration.

pub mod api;
pub mod config;
pub mod coordination;
pub mod index;
pub mod presence;
pub mod session;
pub mod storage;

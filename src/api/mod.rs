//! Peer API Module
//!
//! HTTP surface of a peer. [`node::PeerNode`] holds the protocol logic and the handlers are
//! thin adapters over it.
//!
//! ## Download path
//! 1. **Local hit**: served from the peer's own namespace without any network call.
//! 2. **Miss**: holders are looked up in the file location index and tried in index order,
//!    skipping this peer, within a per-candidate timeout and an overall budget. Peer-to-peer
//!    requests carry `x-peer-fetch` and are served from the remote's cache only.
//! 3. **Replication**: a fetched file is stored locally and this peer is published as an
//!    additional holder. Concurrent misses for the same file share one fetch.

pub mod error;
pub mod handlers;
pub mod node;
pub mod protocol;
pub mod router;

use crate::coordination::types::{BackendError, LeaseId};

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who a peer is and how long its presence outlives its last renewal.
///
/// Created once at startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    pub id: PeerId,
    pub address: SocketAddr,
    pub ttl: Duration,
}

impl PeerIdentity {
    pub fn new(address: SocketAddr, ttl: Duration) -> Self {
        Self {
            id: PeerId::new(),
            address,
            ttl,
        }
    }
}

/// Local view of a peer's presence registration.
///
/// `Unregistered -> Registered -> Reregistering -> Registered | Failed`. Expiry is never
/// observed locally; other peers notice it through the record's absence.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RegistrationState {
    Unregistered,
    Registered { lease: LeaseId },
    Reregistering { attempt: u32 },
    Failed { reason: String },
}

/// Bounded exponential backoff for re-registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Snapshot of the renewal task's counters.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct HeartbeatStats {
    /// Keep-alive acknowledgements received.
    pub renewals: u64,
    /// Successful re-registrations after a closed keep-alive stream.
    pub reregistrations: u64,
    /// Individual re-registration attempts that failed.
    pub failed_attempts: u64,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("presence registry unavailable: {0}")]
    Backend(#[from] BackendError),
}

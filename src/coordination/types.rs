use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Identifier of a lease granted by the coordination backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct LeaseId(pub i64);

/// A single successful renewal reported on a keep-alive stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepAliveAck {
    pub lease: LeaseId,
    /// Remaining time-to-live granted by this renewal.
    pub ttl: Duration,
}

/// Receiving side of a lease keep-alive.
///
/// Yields one `KeepAliveAck` per renewal. The stream ends (`recv` returns `None`) when the
/// lease can no longer be renewed; that is the only abnormal signal a consumer gets.
pub type KeepAliveStream = mpsc::Receiver<KeepAliveAck>;

/// Failures reported by the shared backends (coordination store and metadata index).
///
/// Empty results are never reported through this type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("lease {0:?} not found or expired")]
    LeaseNotFound(LeaseId),
}

impl BackendError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }
}

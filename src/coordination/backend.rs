use super::types::{BackendError, KeepAliveStream, LeaseId};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Lease-capable key-value store used for peer presence.
#[async_trait]
pub trait CoordinationBackend: Send + Sync {
    /// Grants a new lease that expires after `ttl` unless renewed.
    async fn grant_lease(&self, ttl: Duration) -> Result<LeaseId, BackendError>;

    /// Writes `key = value`, bound to `lease`. The key vanishes when the lease does.
    async fn put_with_lease(&self, key: &str, value: &str, lease: LeaseId)
        -> Result<(), BackendError>;

    /// Starts renewing `lease` and returns the acknowledgement stream.
    async fn keep_alive(&self, lease: LeaseId) -> Result<KeepAliveStream, BackendError>;

    /// Returns every live `(key, value)` pair whose key starts with `prefix`.
    async fn get_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, BackendError>;
}

pub type DynCoordinator = Arc<dyn CoordinationBackend>;

use crate::coordination::types::BackendError;

use async_trait::async_trait;
use std::sync::Arc;

/// Set-valued store backing the file location index.
#[async_trait]
pub trait MetadataIndexBackend: Send + Sync {
    /// Adds `member` to the set at `key`. Returns `true` if it was not already present.
    async fn add_to_set(&self, key: &str, member: &str) -> Result<bool, BackendError>;

    /// Members of the set at `key`; an empty vector when the key does not exist.
    async fn set_members(&self, key: &str) -> Result<Vec<String>, BackendError>;

    /// Every key starting with `prefix`.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, BackendError>;
}

pub type DynIndexBackend = Arc<dyn MetadataIndexBackend>;

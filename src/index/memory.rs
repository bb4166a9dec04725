use super::backend::MetadataIndexBackend;
use crate::coordination::types::BackendError;

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// In-process set store. Members keep their insertion order.
#[derive(Clone)]
pub struct MemoryIndex {
    sets: Arc<DashMap<String, Vec<String>>>,
    reachable: Arc<AtomicBool>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            sets: Arc::new(DashMap::new()),
            reachable: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulates an outage of the metadata store.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    fn check_reachable(&self) -> Result<(), BackendError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError::Unavailable(
                "metadata index unreachable".to_string(),
            ))
        }
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataIndexBackend for MemoryIndex {
    async fn add_to_set(&self, key: &str, member: &str) -> Result<bool, BackendError> {
        self.check_reachable()?;

        let mut members = self.sets.entry(key.to_string()).or_default();
        if members.iter().any(|existing| existing == member) {
            return Ok(false);
        }
        members.push(member.to_string());
        Ok(true)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, BackendError> {
        self.check_reachable()?;

        Ok(self
            .sets
            .get(key)
            .map(|members| members.value().clone())
            .unwrap_or_default())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, BackendError> {
        self.check_reachable()?;

        Ok(self
            .sets
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect())
    }
}

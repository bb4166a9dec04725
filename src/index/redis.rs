//! Redis-backed metadata index (`SADD` / `SMEMBERS` / `KEYS`).

use super::backend::MetadataIndexBackend;
use crate::coordination::types::BackendError;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

/// Commands go through a `ConnectionManager`, which reconnects after the server drops
/// the connection instead of failing every later call.
pub struct RedisIndex {
    conn: ConnectionManager,
}

impl RedisIndex {
    pub async fn connect(url: &str) -> Result<Self, BackendError> {
        let client = redis::Client::open(url).map_err(BackendError::unavailable)?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(BackendError::unavailable)?;

        tracing::info!("Connected to redis at {}", url);
        Ok(Self { conn })
    }
}

#[async_trait]
impl MetadataIndexBackend for RedisIndex {
    async fn add_to_set(&self, key: &str, member: &str) -> Result<bool, BackendError> {
        let mut conn = self.conn.clone();
        let added: usize = conn
            .sadd(key, member)
            .await
            .map_err(BackendError::unavailable)?;
        Ok(added > 0)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, BackendError> {
        let mut conn = self.conn.clone();
        conn.smembers(key)
            .await
            .map_err(BackendError::unavailable)
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, BackendError> {
        let mut conn = self.conn.clone();
        conn.keys(format!("{}*", prefix))
            .await
            .map_err(BackendError::unavailable)
    }
}

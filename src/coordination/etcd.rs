//! etcd-backed coordination store.

use super::backend::CoordinationBackend;
use super::renewal::{LeaseRenewer, drive_renewal};
use super::types::{BackendError, KeepAliveStream, LeaseId};

use async_trait::async_trait;
use dashmap::DashMap;
use etcd_client::{
    Client, ConnectOptions, GetOptions, LeaseKeepAliveStream, LeaseKeeper, PutOptions,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const DIAL_TIMEOUT: Duration = Duration::from_secs(5);
const KEEP_ALIVE_BUFFER: usize = 16;
const DEFAULT_TTL: Duration = Duration::from_secs(10);

pub struct EtcdCoordinator {
    client: Client,
    /// TTL requested for each lease, used to pace keep-alive requests.
    granted: Arc<DashMap<LeaseId, Duration>>,
}

impl EtcdCoordinator {
    pub async fn connect(endpoints: &[String]) -> Result<Self, BackendError> {
        let options = ConnectOptions::new().with_connect_timeout(DIAL_TIMEOUT);
        let client = Client::connect(endpoints, Some(options))
            .await
            .map_err(BackendError::unavailable)?;

        tracing::info!("Connected to etcd at {:?}", endpoints);

        Ok(Self {
            client,
            granted: Arc::new(DashMap::new()),
        })
    }
}

struct EtcdRenewer {
    keeper: LeaseKeeper,
    responses: LeaseKeepAliveStream,
}

#[async_trait]
impl LeaseRenewer for EtcdRenewer {
    async fn renew(&mut self) -> Result<Option<i64>, BackendError> {
        self.keeper
            .keep_alive()
            .await
            .map_err(BackendError::unavailable)?;

        let response = self
            .responses
            .message()
            .await
            .map_err(BackendError::unavailable)?;
        Ok(response.map(|r| r.ttl()))
    }
}

#[async_trait]
impl CoordinationBackend for EtcdCoordinator {
    async fn grant_lease(&self, ttl: Duration) -> Result<LeaseId, BackendError> {
        let mut client = self.client.clone();
        let secs = ttl.as_secs().max(1) as i64;
        let response = client
            .lease_grant(secs, None)
            .await
            .map_err(BackendError::unavailable)?;

        let lease = LeaseId(response.id());
        self.granted.insert(lease, Duration::from_secs(secs as u64));
        Ok(lease)
    }

    async fn put_with_lease(
        &self,
        key: &str,
        value: &str,
        lease: LeaseId,
    ) -> Result<(), BackendError> {
        let mut client = self.client.clone();
        client
            .put(key, value, Some(PutOptions::new().with_lease(lease.0)))
            .await
            .map_err(BackendError::unavailable)?;
        Ok(())
    }

    async fn keep_alive(&self, lease: LeaseId) -> Result<KeepAliveStream, BackendError> {
        let mut client = self.client.clone();
        let (keeper, responses) = client
            .lease_keep_alive(lease.0)
            .await
            .map_err(BackendError::unavailable)?;

        let ttl = self
            .granted
            .get(&lease)
            .map(|entry| *entry.value())
            .unwrap_or(DEFAULT_TTL);
        let period = (ttl / 3).max(Duration::from_millis(500));
        let (tx, rx) = mpsc::channel(KEEP_ALIVE_BUFFER);
        let granted = self.granted.clone();

        tokio::spawn(async move {
            let renewer = EtcdRenewer { keeper, responses };
            drive_renewal(lease, ttl, period, tx, renewer).await;
            granted.remove(&lease);
        });

        Ok(rx)
    }

    async fn get_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, BackendError> {
        let mut client = self.client.clone();
        let response = client
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await
            .map_err(BackendError::unavailable)?;

        let mut records = Vec::with_capacity(response.kvs().len());
        for kv in response.kvs() {
            match (kv.key_str(), kv.value_str()) {
                (Ok(key), Ok(value)) => records.push((key.to_string(), value.to_string())),
                _ => tracing::warn!("Skipping non-UTF-8 record under {}", prefix),
            }
        }

        Ok(records)
    }
}

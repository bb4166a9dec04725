use super::error::ApiError;
use super::protocol::{ENDPOINT_DOWNLOAD, HealthResponse, PEER_FETCH_HEADER, UploadResponse};
use crate::index::service::FileLocationIndex;
use crate::presence::service::{HeartbeatMonitor, PresenceRegistry};
use crate::presence::types::{PeerId, PeerIdentity};
use crate::storage::cache::{CacheError, LocalFileCache, validate_filename};

use anyhow::Result;
use axum::body::Bytes;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncRead;
use tokio::sync::OnceCell;
use tokio::time::Instant;

/// Limits applied to fetch-on-miss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSettings {
    /// Timeout of a single GET to one holder.
    pub timeout: Duration,
    /// Deadline covering every candidate of one miss.
    pub budget: Duration,
    /// Maximum number of holders contacted for one miss.
    pub max_candidates: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            budget: Duration::from_secs(15),
            max_candidates: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FetchOutcome {
    /// Stored locally from the holder at this address.
    Fetched { from: String },
    /// Another fetch stored it between the cache check and this one.
    AlreadyCached,
    Missed,
    StoreFailed(String),
}

/// Protocol logic of one peer: local cache first, then the holders recorded in the index.
pub struct PeerNode {
    identity: PeerIdentity,
    cache: LocalFileCache,
    index: Arc<FileLocationIndex>,
    registry: Arc<PresenceRegistry>,
    http_client: reqwest::Client,
    fetch: FetchSettings,
    inflight: DashMap<String, Arc<OnceCell<FetchOutcome>>>,
    heartbeat: HeartbeatMonitor,
}

impl PeerNode {
    pub fn new(
        identity: PeerIdentity,
        cache: LocalFileCache,
        index: Arc<FileLocationIndex>,
        registry: Arc<PresenceRegistry>,
        fetch: FetchSettings,
        heartbeat: HeartbeatMonitor,
    ) -> Self {
        Self {
            identity,
            cache,
            index,
            registry,
            http_client: reqwest::Client::new(),
            fetch,
            inflight: DashMap::new(),
            heartbeat,
        }
    }

    pub fn id(&self) -> &PeerId {
        &self.identity.id
    }

    /// Holder identity recorded in the index.
    pub fn address(&self) -> String {
        self.identity.address.to_string()
    }

    /// Stores `reader` as `filename` and publishes this peer as a holder.
    ///
    /// A publish failure is reported even though the file stays stored locally.
    pub async fn upload<R>(&self, filename: &str, reader: &mut R) -> Result<UploadResponse, ApiError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        validate_filename(filename)?;
        let size = self.cache.save(&self.identity.id, filename, reader).await?;
        let address = self.address();

        if let Err(e) = self.index.record_holder(filename, &address).await {
            return Err(ApiError::Internal(format!(
                "{} stored locally but could not be published: {}",
                filename, e
            )));
        }

        Ok(UploadResponse {
            filename: filename.to_string(),
            peer_id: self.identity.id.clone(),
            address,
            size,
        })
    }

    /// Opens `filename`, fetching it from another holder on a local miss when
    /// `allow_remote` is set.
    pub async fn download(&self, filename: &str, allow_remote: bool) -> Result<File, ApiError> {
        validate_filename(filename)?;

        match self.cache.get(&self.identity.id, filename).await {
            Ok(file) => {
                tracing::debug!("DOWNLOAD: {} served from local cache", filename);
                return Ok(file);
            }
            Err(CacheError::NotFound(_)) if allow_remote => {}
            Err(e) => return Err(e.into()),
        }

        match self.fetch_on_miss(filename).await {
            FetchOutcome::Fetched { from } => {
                tracing::info!("DOWNLOAD: {} replicated from {}", filename, from);
            }
            FetchOutcome::AlreadyCached => {}
            FetchOutcome::Missed => {
                return Err(ApiError::NotFound(format!(
                    "{} is not available from any holder",
                    filename
                )));
            }
            FetchOutcome::StoreFailed(reason) => return Err(ApiError::Internal(reason)),
        }

        Ok(self.cache.get(&self.identity.id, filename).await?)
    }

    pub async fn discover(&self, filename: &str) -> Result<Vec<String>, ApiError> {
        Ok(self.index.get_holders(filename).await?)
    }

    pub async fn peers(&self) -> Result<BTreeMap<PeerId, String>, ApiError> {
        Ok(self.registry.get_active_peers().await?)
    }

    pub async fn files(&self) -> Result<BTreeMap<String, Vec<String>>, ApiError> {
        Ok(self.index.list_all().await?)
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            id: self.identity.id.clone(),
            address: self.address(),
            registration: self.heartbeat.state(),
            stats: self.heartbeat.stats(),
        }
    }

    /// Concurrent misses for one filename share a single fetch.
    async fn fetch_on_miss(&self, filename: &str) -> FetchOutcome {
        let cell = self
            .inflight
            .entry(filename.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let outcome = cell
            .get_or_init(|| self.fetch_from_holders(filename))
            .await
            .clone();

        // Completed fetches are forgotten so a later miss starts a new one.
        self.inflight
            .remove_if(filename, |_, current| Arc::ptr_eq(current, &cell));

        outcome
    }

    async fn fetch_from_holders(&self, filename: &str) -> FetchOutcome {
        if self.cache.contains(&self.identity.id, filename).await {
            return FetchOutcome::AlreadyCached;
        }

        let holders = match self.index.get_holders(filename).await {
            Ok(holders) => holders,
            Err(e) => {
                tracing::warn!("FETCH: Cannot look up holders of {}: {}", filename, e);
                return FetchOutcome::Missed;
            }
        };

        if holders.is_empty() {
            tracing::debug!("FETCH: No holders recorded for {}", filename);
            return FetchOutcome::Missed;
        }

        let own = self.address();
        let deadline = Instant::now() + self.fetch.budget;
        let mut seen = HashSet::new();
        let mut tried = 0;

        for holder in holders {
            if holder == own || !seen.insert(holder.clone()) {
                continue;
            }
            if tried == self.fetch.max_candidates {
                tracing::warn!(
                    "FETCH: Giving up on {} after {} candidate(s)",
                    filename,
                    tried
                );
                break;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                tracing::warn!("FETCH: Budget for {} exhausted", filename);
                break;
            }
            tried += 1;

            let bytes = match self
                .fetch_from_peer(&holder, filename, self.fetch.timeout.min(remaining))
                .await
            {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!("FETCH: {} from {} failed: {}", filename, holder, e);
                    continue;
                }
            };

            let mut reader: &[u8] = &bytes;
            if let Err(e) = self.cache.save(&self.identity.id, filename, &mut reader).await {
                tracing::error!("FETCH: {} from {} could not be stored: {}", filename, holder, e);
                return FetchOutcome::StoreFailed(format!(
                    "fetched {} but could not store it locally",
                    filename
                ));
            }

            if let Err(e) = self.index.record_holder(filename, &own).await {
                tracing::warn!(
                    "FETCH: {} cached locally but not published as holder: {}",
                    filename,
                    e
                );
            }

            return FetchOutcome::Fetched { from: holder };
        }

        FetchOutcome::Missed
    }

    /// Single local-only GET of `filename` from `holder`.
    async fn fetch_from_peer(&self, holder: &str, filename: &str, timeout: Duration) -> Result<Bytes> {
        let url = format!("http://{}{}", holder, ENDPOINT_DOWNLOAD);

        let response = self
            .http_client
            .get(url)
            .query(&[("filename", filename)])
            .header(PEER_FETCH_HEADER, "1")
            .timeout(timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("GET request failed {}", response.status()));
        }

        Ok(response.bytes().await?)
    }
}

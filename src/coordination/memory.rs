//! In-process coordination backend.
//!
//! Keeps leases and lease-bound keys in concurrent maps and expires them on `tokio::time`,
//! so clusters running inside one process (and tests with a paused clock) see the same
//! lease semantics a real etcd cluster provides.

use super::backend::CoordinationBackend;
use super::types::{BackendError, KeepAliveAck, KeepAliveStream, LeaseId};

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

const KEEP_ALIVE_BUFFER: usize = 16;
const MIN_KEEP_ALIVE_INTERVAL: Duration = Duration::from_millis(10);

struct Lease {
    ttl: Duration,
    expires_at: Instant,
}

struct Entry {
    value: String,
    lease: LeaseId,
}

struct Inner {
    leases: DashMap<LeaseId, Lease>,
    entries: DashMap<String, Entry>,
    next_lease: AtomicI64,
    reachable: AtomicBool,
}

impl Inner {
    fn check_reachable(&self) -> Result<(), BackendError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError::Unavailable(
                "coordination backend unreachable".to_string(),
            ))
        }
    }

    fn is_live(&self, lease: LeaseId, now: Instant) -> bool {
        self.leases
            .get(&lease)
            .map(|l| l.expires_at > now)
            .unwrap_or(false)
    }

    /// Extends a live lease by its full TTL. Returns `None` once the lease is gone.
    fn renew(&self, lease: LeaseId) -> Option<Duration> {
        let now = Instant::now();
        let mut entry = self.leases.get_mut(&lease)?;
        if entry.expires_at <= now {
            return None;
        }
        entry.expires_at = now + entry.ttl;
        Some(entry.ttl)
    }

    fn purge_expired(&self) {
        let now = Instant::now();
        let expired: Vec<LeaseId> = self
            .leases
            .iter()
            .filter(|lease| lease.value().expires_at <= now)
            .map(|lease| *lease.key())
            .collect();

        if expired.is_empty() {
            return;
        }

        for lease in &expired {
            self.leases.remove(lease);
            tracing::debug!("Lease {:?} expired", lease);
        }
        self.entries.retain(|_, entry| !expired.contains(&entry.lease));
    }
}

/// Coordination backend living entirely inside the current process.
///
/// Cloning is cheap and every clone shares the same store, which is how several peers in
/// one process observe each other.
#[derive(Clone)]
pub struct MemoryCoordinator {
    inner: Arc<Inner>,
}

impl MemoryCoordinator {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                leases: DashMap::new(),
                entries: DashMap::new(),
                next_lease: AtomicI64::new(1),
                reachable: AtomicBool::new(true),
            }),
        }
    }

    /// Simulates a backend outage (`false`) or its recovery (`true`).
    ///
    /// While unreachable every call fails and running keep-alive streams close.
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Drops a lease and every key bound to it, closing its keep-alive stream on the next tick.
    pub fn revoke_lease(&self, lease: LeaseId) {
        self.inner.leases.remove(&lease);
        self.inner.entries.retain(|_, entry| entry.lease != lease);
    }

    /// Lease currently bound to `key`, if the key is live.
    pub fn lease_of(&self, key: &str) -> Option<LeaseId> {
        self.inner.purge_expired();
        self.inner.entries.get(key).map(|entry| entry.lease)
    }

    pub fn live_lease_count(&self) -> usize {
        self.inner.purge_expired();
        self.inner.leases.len()
    }
}

impl Default for MemoryCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordinationBackend for MemoryCoordinator {
    async fn grant_lease(&self, ttl: Duration) -> Result<LeaseId, BackendError> {
        self.inner.check_reachable()?;

        let lease = LeaseId(self.inner.next_lease.fetch_add(1, Ordering::SeqCst));
        self.inner.leases.insert(
            lease,
            Lease {
                ttl,
                expires_at: Instant::now() + ttl,
            },
        );

        tracing::debug!("Granted lease {:?} (ttl={:?})", lease, ttl);
        Ok(lease)
    }

    async fn put_with_lease(
        &self,
        key: &str,
        value: &str,
        lease: LeaseId,
    ) -> Result<(), BackendError> {
        self.inner.check_reachable()?;
        self.inner.purge_expired();

        if !self.inner.is_live(lease, Instant::now()) {
            return Err(BackendError::LeaseNotFound(lease));
        }

        self.inner.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                lease,
            },
        );
        Ok(())
    }

    async fn keep_alive(&self, lease: LeaseId) -> Result<KeepAliveStream, BackendError> {
        self.inner.check_reachable()?;

        let ttl = self
            .inner
            .renew(lease)
            .ok_or(BackendError::LeaseNotFound(lease))?;
        let (tx, rx) = mpsc::channel(KEEP_ALIVE_BUFFER);
        let inner = self.inner.clone();
        let period = (ttl / 3).max(MIN_KEEP_ALIVE_INTERVAL);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    _ = ticker.tick() => {}
                }

                if inner.check_reachable().is_err() {
                    tracing::debug!("Keep-alive for {:?} lost its backend", lease);
                    break;
                }

                match inner.renew(lease) {
                    Some(ttl) => {
                        if tx.send(KeepAliveAck { lease, ttl }).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        tracing::debug!("Keep-alive for {:?} found no live lease", lease);
                        break;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn get_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, BackendError> {
        self.inner.check_reachable()?;
        self.inner.purge_expired();

        let mut records: Vec<(String, String)> = self
            .inner
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| (entry.key().clone(), entry.value().value.clone()))
            .collect();
        records.sort();

        Ok(records)
    }
}

use super::types::{
    HeartbeatStats, PeerId, PeerIdentity, RegistrationState, RegistryError, RetryPolicy,
};
use crate::coordination::backend::DynCoordinator;
use crate::coordination::types::{BackendError, KeepAliveStream, LeaseId};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::info;

/// Namespace of presence records: `/peers/<peer id>` = address.
pub const PEER_KEY_PREFIX: &str = "/peers/";

pub fn peer_key(id: &PeerId) -> String {
    format!("{}{}", PEER_KEY_PREFIX, id.0)
}

/// Lease-bound liveness records for every peer in the cluster.
pub struct PresenceRegistry {
    backend: DynCoordinator,
    retry: RetryPolicy,
}

impl PresenceRegistry {
    pub fn new(backend: DynCoordinator, retry: RetryPolicy) -> Arc<Self> {
        Arc::new(Self { backend, retry })
    }

    /// Publishes `identity` under a fresh lease and starts renewing it in the background.
    ///
    /// Fails if the initial lease, write or keep-alive cannot be established; callers treat
    /// that as fatal for the peer. Once this returns, the record is confirmed written.
    pub async fn register_with_heartbeat(
        self: &Arc<Self>,
        identity: &PeerIdentity,
    ) -> Result<Heartbeat, RegistryError> {
        let key = peer_key(&identity.id);
        let (lease, stream) = self.register_once(&key, identity).await?;

        info!(
            "Peer {} registered at {} (lease={:?}, ttl={:?})",
            identity.id, identity.address, lease, identity.ttl
        );

        let (state_tx, state_rx) = watch::channel(RegistrationState::Registered { lease });
        let counters = Arc::new(HeartbeatCounters::default());
        let (stop_tx, stop_rx) = oneshot::channel();

        let task = RenewalTask {
            registry: self.clone(),
            identity: identity.clone(),
            key,
            state: state_tx,
            counters: counters.clone(),
        };
        let handle = tokio::spawn(task.run(stream, stop_rx));

        Ok(Heartbeat {
            monitor: HeartbeatMonitor {
                state: state_rx,
                counters,
            },
            stop: Some(stop_tx),
            task: Some(handle),
        })
    }

    /// Live peers as `id -> address`. An empty map means nobody is currently registered.
    pub async fn get_active_peers(&self) -> Result<BTreeMap<PeerId, String>, RegistryError> {
        let records = self.backend.get_prefix(PEER_KEY_PREFIX).await?;

        Ok(records
            .into_iter()
            .filter_map(|(key, address)| {
                key.strip_prefix(PEER_KEY_PREFIX)
                    .map(|id| (PeerId(id.to_string()), address))
            })
            .collect())
    }

    async fn register_once(
        &self,
        key: &str,
        identity: &PeerIdentity,
    ) -> Result<(LeaseId, KeepAliveStream), BackendError> {
        let lease = self.backend.grant_lease(identity.ttl).await?;
        self.backend
            .put_with_lease(key, &identity.address.to_string(), lease)
            .await?;
        let stream = self.backend.keep_alive(lease).await?;
        Ok((lease, stream))
    }
}

#[derive(Default)]
struct HeartbeatCounters {
    renewals: AtomicU64,
    reregistrations: AtomicU64,
    failed_attempts: AtomicU64,
}

impl HeartbeatCounters {
    fn snapshot(&self) -> HeartbeatStats {
        HeartbeatStats {
            renewals: self.renewals.load(Ordering::Relaxed),
            reregistrations: self.reregistrations.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
        }
    }
}

/// Read-only view of a heartbeat, shareable with request handlers.
#[derive(Clone)]
pub struct HeartbeatMonitor {
    state: watch::Receiver<RegistrationState>,
    counters: Arc<HeartbeatCounters>,
}

impl HeartbeatMonitor {
    pub fn state(&self) -> RegistrationState {
        self.state.borrow().clone()
    }

    pub fn stats(&self) -> HeartbeatStats {
        self.counters.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<RegistrationState> {
        self.state.clone()
    }

    /// Resolves with the failure reason once renewal has given up for good.
    ///
    /// Never resolves for a heartbeat that is stopped without failing.
    pub async fn failed(&self) -> String {
        let mut state = self.state.clone();

        loop {
            let reason = failure_reason(&state.borrow_and_update());
            if let Some(reason) = reason {
                return reason;
            }

            if state.changed().await.is_err() {
                let reason = failure_reason(&state.borrow());
                return match reason {
                    Some(reason) => reason,
                    None => std::future::pending().await,
                };
            }
        }
    }
}

fn failure_reason(state: &RegistrationState) -> Option<String> {
    match state {
        RegistrationState::Failed { reason } => Some(reason.clone()),
        _ => None,
    }
}

/// Owning handle of a peer's background lease renewal.
///
/// Dropping the handle stops renewal; the presence record then expires within one TTL.
pub struct Heartbeat {
    monitor: HeartbeatMonitor,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Heartbeat {
    pub fn monitor(&self) -> HeartbeatMonitor {
        self.monitor.clone()
    }

    pub fn state(&self) -> RegistrationState {
        self.monitor.state()
    }

    pub fn stats(&self) -> HeartbeatStats {
        self.monitor.stats()
    }

    pub async fn failed(&self) -> String {
        self.monitor.failed().await
    }

    /// Stops renewal and waits for the task to exit. The lease is left to expire.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("Renewal task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

struct RenewalTask {
    registry: Arc<PresenceRegistry>,
    identity: PeerIdentity,
    key: String,
    state: watch::Sender<RegistrationState>,
    counters: Arc<HeartbeatCounters>,
}

impl RenewalTask {
    async fn run(self, mut stream: KeepAliveStream, mut stop: oneshot::Receiver<()>) {
        loop {
            tokio::select! {
                _ = &mut stop => {
                    tracing::debug!("Heartbeat for peer {} stopped", self.identity.id);
                    self.state.send_replace(RegistrationState::Unregistered);
                    return;
                }
                ack = stream.recv() => {
                    let Some(ack) = ack else {
                        tracing::warn!(
                            "Keep-alive stream closed for peer {}. Re-registering...",
                            self.identity.id
                        );

                        match self.reregister(&mut stop).await {
                            Some(renewed) => stream = renewed,
                            None => return,
                        }
                        continue;
                    };

                    self.counters.renewals.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(
                        "Lease {:?} renewed for peer {} (ttl={:?})",
                        ack.lease,
                        self.identity.id,
                        ack.ttl
                    );
                }
            }
        }
    }

    /// Grants a new lease, rewrites the record and reopens the keep-alive, with backoff.
    ///
    /// Returns `None` when stopped or when every attempt failed; the latter leaves the
    /// state at `Failed`.
    async fn reregister(&self, stop: &mut oneshot::Receiver<()>) -> Option<KeepAliveStream> {
        let policy = &self.registry.retry;
        let mut delay = policy.initial_backoff;
        let mut last_error = String::from("no attempts configured");

        for attempt in 1..=policy.max_attempts {
            self.state
                .send_replace(RegistrationState::Reregistering { attempt });

            match self.registry.register_once(&self.key, &self.identity).await {
                Ok((lease, stream)) => {
                    self.counters.reregistrations.fetch_add(1, Ordering::Relaxed);
                    self.state
                        .send_replace(RegistrationState::Registered { lease });
                    info!(
                        "Peer {} re-registered at {} after {} attempt(s) (lease={:?})",
                        self.identity.id, self.identity.address, attempt, lease
                    );
                    return Some(stream);
                }
                Err(e) => {
                    self.counters.failed_attempts.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        "Re-registration attempt {}/{} for peer {} failed: {}",
                        attempt,
                        policy.max_attempts,
                        self.identity.id,
                        e
                    );
                    last_error = e.to_string();
                }
            }

            if attempt == policy.max_attempts {
                break;
            }

            let jitter = Duration::from_millis(rand::random::<u64>() % 50);
            tokio::select! {
                _ = &mut *stop => {
                    self.state.send_replace(RegistrationState::Unregistered);
                    return None;
                }
                _ = tokio::time::sleep(delay + jitter) => {}
            }
            delay = (delay * 2).min(policy.max_backoff);
        }

        let reason = format!(
            "re-registration gave up after {} attempt(s): {}",
            policy.max_attempts, last_error
        );
        tracing::error!("Peer {} lost its presence record: {}", self.identity.id, reason);
        self.state.send_replace(RegistrationState::Failed { reason });
        None
    }
}

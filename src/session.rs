//! Peer Session
//!
//! Wires one peer together: HTTP listener, storage namespace, presence registration and
//! the request router. A session is ready as soon as [`PeerSession::start`] returns, since
//! its presence record has been confirmed written by then.

use crate::api::node::{FetchSettings, PeerNode};
use crate::api::router::router;
use crate::index::service::FileLocationIndex;
use crate::presence::service::{Heartbeat, PresenceRegistry};
use crate::presence::types::{PeerIdentity, RegistryError};
use crate::storage::cache::{CacheError, LocalFileCache};

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;

/// Failures that prevent a peer from joining the cluster.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot prepare storage namespace: {0}")]
    Storage(#[from] CacheError),
    #[error("cannot register presence: {0}")]
    Registration(#[from] RegistryError),
}

/// Reasons a running session ended other than a requested shutdown.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("presence heartbeat failed: {0}")]
    HeartbeatFailed(String),
    #[error("HTTP server failed: {0}")]
    Server(#[from] std::io::Error),
}

/// Components shared by every peer of a process.
#[derive(Clone)]
pub struct SessionDeps {
    pub registry: Arc<PresenceRegistry>,
    pub index: Arc<FileLocationIndex>,
    pub cache: LocalFileCache,
    pub fetch: FetchSettings,
    pub max_upload_bytes: usize,
}

pub struct PeerSession {
    identity: PeerIdentity,
    node: Arc<PeerNode>,
    listener: TcpListener,
    heartbeat: Heartbeat,
    max_upload_bytes: usize,
}

impl PeerSession {
    /// Binds `bind`, creates the storage namespace and registers presence.
    ///
    /// Binding port 0 picks a free port; the bound address becomes the peer's identity.
    pub async fn start(
        bind: SocketAddr,
        ttl: Duration,
        deps: SessionDeps,
    ) -> Result<Self, StartupError> {
        let listener = TcpListener::bind(bind)
            .await
            .map_err(|source| StartupError::Bind { addr: bind, source })?;
        let address = listener
            .local_addr()
            .map_err(|source| StartupError::Bind { addr: bind, source })?;

        let identity = PeerIdentity::new(address, ttl);
        let namespace = deps.cache.ensure_namespace(&identity.id).await?;
        tracing::debug!("Peer {} stores files in {}", identity.id, namespace.display());

        let heartbeat = deps.registry.register_with_heartbeat(&identity).await?;

        let node = Arc::new(PeerNode::new(
            identity.clone(),
            deps.cache,
            deps.index,
            deps.registry,
            deps.fetch,
            heartbeat.monitor(),
        ));

        Ok(Self {
            identity,
            node,
            listener,
            heartbeat,
            max_upload_bytes: deps.max_upload_bytes,
        })
    }

    pub fn identity(&self) -> &PeerIdentity {
        &self.identity
    }

    pub fn node(&self) -> Arc<PeerNode> {
        self.node.clone()
    }

    /// Serves requests until `shutdown` resolves or the heartbeat fails for good.
    ///
    /// Renewal stops when this returns; the presence record then expires within one TTL.
    pub async fn run<F>(self, shutdown: F) -> Result<(), SessionError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Self {
            identity,
            node,
            listener,
            heartbeat,
            max_upload_bytes,
        } = self;

        let app = router(node, max_upload_bytes);
        let monitor = heartbeat.monitor();
        tracing::info!("Peer {} serving on http://{}", identity.id, identity.address);

        let server = async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
        };

        let result = tokio::select! {
            served = server => served.map_err(SessionError::from),
            reason = monitor.failed() => Err(SessionError::HeartbeatFailed(reason)),
        };

        heartbeat.stop().await;
        match &result {
            Ok(()) => tracing::info!("Peer {} shut down", identity.id),
            Err(e) => tracing::error!("Peer {} stopped: {}", identity.id, e),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::memory::MemoryCoordinator;
    use crate::index::memory::MemoryIndex;
    use crate::presence::types::RetryPolicy;
    use tokio::sync::oneshot;

    fn deps(backend: &MemoryCoordinator, dir: &std::path::Path, retry: RetryPolicy) -> SessionDeps {
        SessionDeps {
            registry: PresenceRegistry::new(Arc::new(backend.clone()), retry),
            index: Arc::new(FileLocationIndex::new(Arc::new(MemoryIndex::new()))),
            cache: LocalFileCache::new(dir),
            fetch: FetchSettings::default(),
            max_upload_bytes: 1024 * 1024,
        }
    }

    #[tokio::test]
    async fn test_start_registers_before_returning() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MemoryCoordinator::new();
        let deps = deps(&backend, dir.path(), RetryPolicy::default());
        let registry = deps.registry.clone();

        let session = PeerSession::start("127.0.0.1:0".parse().unwrap(), Duration::from_secs(10), deps)
            .await
            .unwrap();

        assert_ne!(session.identity().address.port(), 0);
        assert!(dir.path().join(&session.identity().id.0).is_dir());

        let peers = registry.get_active_peers().await.unwrap();
        assert_eq!(
            peers.get(&session.identity().id),
            Some(&session.identity().address.to_string())
        );
    }

    #[tokio::test]
    async fn test_start_fails_when_backend_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MemoryCoordinator::new();
        backend.set_reachable(false);

        let result = PeerSession::start(
            "127.0.0.1:0".parse().unwrap(),
            Duration::from_secs(10),
            deps(&backend, dir.path(), RetryPolicy::default()),
        )
        .await;

        assert!(matches!(result, Err(StartupError::Registration(_))));
    }

    #[tokio::test]
    async fn test_graceful_shutdown_stops_serving() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MemoryCoordinator::new();
        let session = PeerSession::start(
            "127.0.0.1:0".parse().unwrap(),
            Duration::from_secs(10),
            deps(&backend, dir.path(), RetryPolicy::default()),
        )
        .await
        .unwrap();
        let address = session.identity().address;

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let running = tokio::spawn(session.run(async move {
            let _ = stop_rx.await;
        }));

        let health = reqwest::get(format!("http://{}/health", address)).await.unwrap();
        assert_eq!(health.status(), reqwest::StatusCode::OK);
        let body: serde_json::Value = health.json().await.unwrap();
        assert_eq!(body["registration"]["state"], "registered");

        stop_tx.send(()).unwrap();
        let result = running.await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_failed_heartbeat_ends_session() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MemoryCoordinator::new();
        let retry = RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(20),
        };
        let session = PeerSession::start(
            "127.0.0.1:0".parse().unwrap(),
            Duration::from_millis(300),
            deps(&backend, dir.path(), retry),
        )
        .await
        .unwrap();

        backend.set_reachable(false);

        let result = tokio::time::timeout(
            Duration::from_secs(10),
            session.run(std::future::pending()),
        )
        .await
        .expect("session should end on heartbeat failure");

        assert!(matches!(result, Err(SessionError::HeartbeatFailed(_))));
    }
}

use anyhow::{Context, Result};
use clap::Parser;
use phile_peer::config::{CoordinationKind, IndexKind, PeerConfig};
use phile_peer::coordination::backend::DynCoordinator;
use phile_peer::coordination::memory::MemoryCoordinator;
use phile_peer::index::backend::DynIndexBackend;
use phile_peer::index::memory::MemoryIndex;
use phile_peer::index::service::FileLocationIndex;
use phile_peer::presence::service::PresenceRegistry;
use phile_peer::session::{PeerSession, SessionDeps};
use phile_peer::storage::cache::LocalFileCache;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = PeerConfig::parse();

    if let Err(e) = run(config).await {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(config: PeerConfig) -> Result<()> {
    config.validate().map_err(anyhow::Error::msg)?;

    // 1. Shared backends:
    let coordinator = connect_coordination(&config).await?;
    let index_backend = connect_index(&config).await?;

    // 2. Storage root:
    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .with_context(|| format!("cannot create data dir {}", config.data_dir.display()))?;

    let deps = SessionDeps {
        registry: PresenceRegistry::new(coordinator, config.retry_policy()),
        index: Arc::new(FileLocationIndex::new(index_backend)),
        cache: LocalFileCache::new(&config.data_dir),
        fetch: config.fetch_settings(),
        max_upload_bytes: config.max_upload_bytes,
    };

    // 3. Peers, one after another, each ready before the next starts:
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut sessions = JoinSet::new();

    for i in 0..config.peers {
        let bind = config
            .bind_addr(i)
            .with_context(|| format!("no port left for peer #{}", i + 1))?;

        let session = PeerSession::start(bind, config.ttl(), deps.clone())
            .await
            .with_context(|| format!("peer on {} failed to start", bind))?;
        tracing::info!(
            "Peer {}/{} ready: id={} address={}",
            i + 1,
            config.peers,
            session.identity().id,
            session.identity().address
        );

        let mut stop = shutdown_rx.clone();
        sessions.spawn(session.run(async move {
            let _ = stop.changed().await;
        }));
    }

    tracing::info!("Press Ctrl+C to shutdown");

    // 4. Serve until Ctrl-C or until any peer ends on its own:
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut failure = None;

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Shutdown requested");
                break;
            }
            joined = sessions.join_next() => match joined {
                None => break,
                Some(Ok(Ok(()))) => {}
                Some(Ok(Err(e))) => {
                    failure = Some(anyhow::Error::new(e).context("peer session ended"));
                    break;
                }
                Some(Err(e)) => {
                    failure = Some(anyhow::Error::new(e).context("peer session panicked"));
                    break;
                }
            }
        }
    }

    let _ = shutdown_tx.send(true);
    while let Some(joined) = sessions.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Peer session ended with error: {}", e),
            Err(e) => tracing::warn!("Peer session task failed: {}", e),
        }
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn connect_coordination(config: &PeerConfig) -> Result<DynCoordinator> {
    match config.coordination {
        CoordinationKind::Memory => {
            if config.peers == 1 {
                tracing::warn!("In-memory coordination: this peer will only ever see itself");
            }
            Ok(Arc::new(MemoryCoordinator::new()))
        }
        CoordinationKind::Etcd => connect_etcd(&config.etcd_endpoints).await,
    }
}

#[cfg(feature = "etcd")]
async fn connect_etcd(endpoints: &[String]) -> Result<DynCoordinator> {
    let coordinator = phile_peer::coordination::etcd::EtcdCoordinator::connect(endpoints)
        .await
        .with_context(|| format!("cannot reach etcd at {:?}", endpoints))?;
    Ok(Arc::new(coordinator))
}

#[cfg(not(feature = "etcd"))]
async fn connect_etcd(_endpoints: &[String]) -> Result<DynCoordinator> {
    anyhow::bail!("--coordination etcd requires a build with the `etcd` feature")
}

async fn connect_index(config: &PeerConfig) -> Result<DynIndexBackend> {
    match config.index {
        IndexKind::Memory => Ok(Arc::new(MemoryIndex::new())),
        IndexKind::Redis => connect_redis(&config.redis_url).await,
    }
}

#[cfg(feature = "redis")]
async fn connect_redis(url: &str) -> Result<DynIndexBackend> {
    let index = phile_peer::index::redis::RedisIndex::connect(url)
        .await
        .with_context(|| format!("cannot reach redis at {}", url))?;
    Ok(Arc::new(index))
}

#[cfg(not(feature = "redis"))]
async fn connect_redis(_url: &str) -> Result<DynIndexBackend> {
    anyhow::bail!("--index redis requires a build with the `redis` feature")
}

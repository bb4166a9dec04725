//! Command-line and environment configuration of the `phile-peer` binary.

use crate::api::node::FetchSettings;
use crate::presence::types::RetryPolicy;

use clap::{Parser, ValueEnum};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CoordinationKind {
    /// In-process leases; only peers of the same process see each other.
    Memory,
    /// etcd cluster (requires the `etcd` feature).
    Etcd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IndexKind {
    /// In-process holder sets.
    Memory,
    /// Redis sets (requires the `redis` feature).
    Redis,
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Peer-to-peer file storage overlay")]
pub struct PeerConfig {
    /// Number of peers to run in this process, on consecutive ports.
    #[arg(long, env = "PHILE_PEERS", default_value_t = 1)]
    pub peers: u16,

    /// Address peers bind to and advertise.
    #[arg(long, env = "PHILE_HOST", default_value = "127.0.0.1")]
    pub host: IpAddr,

    /// Port of the first peer.
    #[arg(long, env = "PHILE_BASE_PORT", default_value_t = 5001)]
    pub base_port: u16,

    /// Root of the per-peer storage namespaces.
    #[arg(long, env = "PHILE_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Presence lease TTL in seconds.
    #[arg(long, env = "PHILE_TTL_SECS", default_value_t = 10)]
    pub ttl_secs: u64,

    #[arg(long, env = "PHILE_COORDINATION", value_enum, default_value_t = CoordinationKind::Memory)]
    pub coordination: CoordinationKind,

    #[arg(
        long,
        env = "PHILE_ETCD_ENDPOINTS",
        value_delimiter = ',',
        default_value = "http://127.0.0.1:2379"
    )]
    pub etcd_endpoints: Vec<String>,

    #[arg(long, env = "PHILE_INDEX", value_enum, default_value_t = IndexKind::Memory)]
    pub index: IndexKind,

    #[arg(long, env = "PHILE_REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    /// Timeout of one peer-to-peer fetch.
    #[arg(long, env = "PHILE_FETCH_TIMEOUT_MS", default_value_t = 5_000)]
    pub fetch_timeout_ms: u64,

    /// Overall deadline for fetching one missing file.
    #[arg(long, env = "PHILE_FETCH_BUDGET_MS", default_value_t = 15_000)]
    pub fetch_budget_ms: u64,

    /// Maximum holders contacted for one missing file.
    #[arg(long, env = "PHILE_MAX_CANDIDATES", default_value_t = 5)]
    pub max_candidates: usize,

    #[arg(long, env = "PHILE_REREGISTER_ATTEMPTS", default_value_t = 8)]
    pub reregister_attempts: u32,

    #[arg(long, env = "PHILE_REREGISTER_BACKOFF_MS", default_value_t = 200)]
    pub reregister_backoff_ms: u64,

    #[arg(long, env = "PHILE_REREGISTER_MAX_BACKOFF_MS", default_value_t = 5_000)]
    pub reregister_max_backoff_ms: u64,

    /// Largest accepted upload body.
    #[arg(long, env = "PHILE_MAX_UPLOAD_BYTES", default_value_t = 64 * 1024 * 1024)]
    pub max_upload_bytes: usize,
}

impl PeerConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            timeout: Duration::from_millis(self.fetch_timeout_ms),
            budget: Duration::from_millis(self.fetch_budget_ms),
            max_candidates: self.max_candidates,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.reregister_attempts,
            initial_backoff: Duration::from_millis(self.reregister_backoff_ms),
            max_backoff: Duration::from_millis(self.reregister_max_backoff_ms),
        }
    }

    /// Bind address of the `index`-th local peer, or `None` past the last port.
    pub fn bind_addr(&self, index: u16) -> Option<SocketAddr> {
        let port = self.base_port.checked_add(index)?;
        Some(SocketAddr::new(self.host, port))
    }

    /// Rejects settings that would make every peer useless.
    pub fn validate(&self) -> Result<(), String> {
        if self.peers == 0 {
            return Err("--peers must be at least 1".to_string());
        }
        if self.ttl_secs == 0 {
            return Err("--ttl-secs must be at least 1".to_string());
        }
        if self.max_candidates == 0 {
            return Err("--max-candidates must be at least 1".to_string());
        }
        if self.bind_addr(self.peers - 1).is_none() {
            return Err(format!(
                "{} peers starting at port {} exceed the port range",
                self.peers, self.base_port
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PeerConfig::parse_from(["phile-peer"]);

        assert_eq!(config.peers, 1);
        assert_eq!(config.base_port, 5001);
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.ttl(), Duration::from_secs(10));
        assert_eq!(config.coordination, CoordinationKind::Memory);
        assert_eq!(config.index, IndexKind::Memory);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.fetch_settings(), FetchSettings::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_local_peers_use_consecutive_ports() {
        let config = PeerConfig::parse_from(["phile-peer", "--peers", "3", "--base-port", "6000"]);

        assert_eq!(config.bind_addr(0), Some("127.0.0.1:6000".parse().unwrap()));
        assert_eq!(config.bind_addr(2), Some("127.0.0.1:6002".parse().unwrap()));
    }

    #[test]
    fn test_port_overflow_is_rejected() {
        let config = PeerConfig::parse_from(["phile-peer", "--peers", "3", "--base-port", "65534"]);

        assert_eq!(config.bind_addr(2), None);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backend_selection() {
        let config = PeerConfig::parse_from([
            "phile-peer",
            "--coordination",
            "etcd",
            "--etcd-endpoints",
            "http://a:2379,http://b:2379",
            "--index",
            "redis",
        ]);

        assert_eq!(config.coordination, CoordinationKind::Etcd);
        assert_eq!(config.etcd_endpoints, vec!["http://a:2379", "http://b:2379"]);
        assert_eq!(config.index, IndexKind::Redis);
    }
}

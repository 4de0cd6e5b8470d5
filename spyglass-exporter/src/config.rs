//! Exporter configuration
//!
//! Settings come from an optional YAML file (path in `SPYGLASS_CONFIG`,
//! default `spyglass.yaml`) with sane defaults when the file is missing or
//! invalid. The cluster credential is never read from the file, only from
//! `SPYGLASS_CLUSTER_PASSWORD`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// Socket address the HTTP exposition surface binds to.
    pub listen_addr: String,
    /// Interval between CPU counter snapshots, in seconds.
    pub cpu_sample_interval_secs: u64,
    pub topology: TopologyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Ordered, comma-separated list of discovery broker addresses
    /// (`host:port,host:port,...`). Order decides which answer wins.
    pub brokers: String,
    /// Cluster name the brokers are asked about.
    pub cluster_name: String,
    /// Per-broker query timeout in milliseconds.
    pub discovery_timeout_ms: u64,
    /// Primary liveness/role query timeout in milliseconds.
    pub verify_timeout_ms: u64,
    /// Credential for the primary connection. Env only, never serialized.
    #[serde(skip)]
    pub password: Option<String>,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9200".to_string(),
            cpu_sample_interval_secs: 5,
            topology: TopologyConfig::default(),
        }
    }
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            brokers: String::new(),
            cluster_name: "main".to_string(),
            discovery_timeout_ms: 2000,
            verify_timeout_ms: 2000,
            password: None,
        }
    }
}

impl TopologyConfig {
    pub fn broker_list(&self) -> Vec<String> {
        parse_broker_list(&self.brokers)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_millis(self.verify_timeout_ms)
    }
}

/// Split the configured broker string, trimming whitespace and dropping
/// empty elements so trailing commas are harmless.
pub fn parse_broker_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

pub async fn load_config() -> ExporterConfig {
    let path = std::env::var("SPYGLASS_CONFIG").unwrap_or_else(|_| "spyglass.yaml".into());
    let mut cfg = if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        if txt.trim().is_empty() {
            ExporterConfig::default()
        } else {
            serde_yaml::from_str(&txt).unwrap_or_else(|e| {
                warn!("invalid config {path}: {e}, using defaults");
                ExporterConfig::default()
            })
        }
    } else {
        warn!("no config file at {path}, using defaults");
        ExporterConfig::default()
    };

    cfg.topology.password = std::env::var("SPYGLASS_CLUSTER_PASSWORD")
        .ok()
        .filter(|p| !p.is_empty());
    cfg
}

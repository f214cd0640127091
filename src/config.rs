//! Layered configuration: TOML file, environment-variable overrides, then
//! per-section validation with a fallback-to-default-and-warn policy,
//! adapted to the ensemble's shape instead of a single cache node's.

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;

use crate::Result;

/// Top-level configuration for one ensemble node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// This process's own node identity and listen address.
    pub node: NodeConfig,
    /// Name of the cluster this node belongs to.
    pub local_cluster: String,
    /// Other clusters in the ensemble, named with their seed addresses.
    pub remote_clusters: Vec<RemoteClusterConfig>,
    pub discovery: DiscoveryConfig,
    pub update: UpdateConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Name this node advertises in its own View.
    pub name: String,
    pub bind_addr: String,
    pub port: u16,
    /// Size of the bounded worker pool used to dispatch local commands.
    pub worker_pool_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteClusterConfig {
    pub name: String,
    pub seeds: Vec<SeedConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// How often the EnsembleManager probes each cluster's membership.
    pub interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Timeout applied to a named Update when the caller doesn't specify one.
    pub default_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Minimum time a bucket's sorted-key range cache is trusted before
    /// being rebuilt from scratch.
    pub range_cache_ttl_floor_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, error
    pub level: String,
    /// json or pretty
    pub format: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "node-1".to_string(),
            bind_addr: "127.0.0.1".to_string(),
            port: 7000,
            worker_pool_size: num_cpus::get().max(1),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self { default_timeout_ms: 1000 }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { range_cache_ttl_floor_ms: 50 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            local_cluster: "local".to_string(),
            remote_clusters: Vec::new(),
            discovery: DiscoveryConfig::default(),
            update: UpdateConfig::default(),
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from `config/default.toml` if present, overlay
    /// environment variables, then validate each section independently:
    /// a section that fails validation falls back to its default rather
    /// than aborting startup.
    pub async fn load() -> Result<Self> {
        let mut config = if std::path::Path::new("config/default.toml").exists() {
            let content = fs::read_to_string("config/default.toml").await?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        config.apply_env_overrides();

        if let Err(e) = config.validate_node() {
            warn!(error = %e, "invalid node configuration, falling back to defaults");
            config.node = NodeConfig::default();
        }
        if let Err(e) = config.validate_discovery() {
            warn!(error = %e, "invalid discovery configuration, falling back to defaults");
            config.discovery = DiscoveryConfig::default();
        }
        if let Err(e) = config.validate_update() {
            warn!(error = %e, "invalid update configuration, falling back to defaults");
            config.update = UpdateConfig::default();
        }
        if let Err(e) = config.validate_logging() {
            warn!(error = %e, "invalid logging configuration, falling back to defaults");
            config.logging = LoggingConfig::default();
        }

        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(name) = std::env::var("ENSEMBLESTORE_NODE_NAME") {
            self.node.name = name;
        }
        if let Ok(addr) = std::env::var("ENSEMBLESTORE_BIND_ADDR") {
            self.node.bind_addr = addr;
        }
        if let Ok(port) = std::env::var("ENSEMBLESTORE_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.node.port = port;
            }
        }
        if let Ok(cluster) = std::env::var("ENSEMBLESTORE_LOCAL_CLUSTER") {
            self.local_cluster = cluster;
        }
        if let Ok(workers) = std::env::var("ENSEMBLESTORE_WORKER_POOL_SIZE") {
            if let Ok(workers) = workers.parse::<usize>() {
                self.node.worker_pool_size = workers;
            }
        }
        if let Ok(interval) = std::env::var("ENSEMBLESTORE_DISCOVERY_INTERVAL_MS") {
            if let Ok(interval) = interval.parse::<u64>() {
                self.discovery.interval_ms = interval;
            }
        }
        if let Ok(timeout) = std::env::var("ENSEMBLESTORE_DEFAULT_UPDATE_TIMEOUT_MS") {
            if let Ok(timeout) = timeout.parse::<u64>() {
                self.update.default_timeout_ms = timeout;
            }
        }
        if let Ok(level) = std::env::var("ENSEMBLESTORE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("ENSEMBLESTORE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    fn validate_node(&self) -> std::result::Result<(), String> {
        if self.node.name.is_empty() {
            return Err("node name must not be empty".to_string());
        }
        if self.node.worker_pool_size == 0 {
            return Err("worker pool size must be greater than 0".to_string());
        }
        Ok(())
    }

    fn validate_discovery(&self) -> std::result::Result<(), String> {
        if self.discovery.interval_ms == 0 {
            return Err("discovery interval must be greater than 0".to_string());
        }
        Ok(())
    }

    fn validate_update(&self) -> std::result::Result<(), String> {
        if self.update.default_timeout_ms == 0 {
            return Err("default update timeout must be greater than 0".to_string());
        }
        Ok(())
    }

    fn validate_logging(&self) -> std::result::Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "invalid log level: {}, expected one of {:?}",
                self.logging.level, valid_levels
            ));
        }
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(format!(
                "invalid log format: {}, expected one of {:?}",
                self.logging.format, valid_formats
            ));
        }
        Ok(())
    }

    /// Remote cluster ids this node should know about, independent of live
    /// membership (which discovery fills in over time).
    pub fn remote_cluster_ids(&self) -> Vec<crate::cluster::ClusterId> {
        self.remote_clusters
            .iter()
            .map(|c| crate::cluster::ClusterId::new(c.name.clone()))
            .collect()
    }
}

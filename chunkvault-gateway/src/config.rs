//! Gateway configuration
//!
//! Loaded from a TOML file, then overridden by `CHUNKVAULT_*` environment
//! variables, then by CLI flags. Every section has defaults, so an empty file
//! (or none) yields a working single-process setup with the in-memory
//! metadata store.

use chunkvault_core::{
    DEFAULT_CHUNK_SIZE, DEFAULT_PBKDF2_ITERATIONS, DEFAULT_REPLICATION_FACTOR,
    MIN_PBKDF2_ITERATIONS,
};
use chunkvault_metadata::DbConfig;
use chunkvault_network::NodeClientConfig;
use chunkvault_rebalancer::RebalancerConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Complete gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub health: HealthSettings,

    #[serde(default)]
    pub repair: RepairSettings,

    #[serde(default)]
    pub node_client: NodeClientSettings,

    #[serde(default)]
    pub database: DatabaseSettings,

    /// Statically configured storage nodes, registered at startup
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Largest accepted upload body in MiB
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,

    /// Allow any origin (development only)
    #[serde(default)]
    pub cors_permissive: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_upload_mb: default_max_upload_mb(),
            cors_permissive: false,
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_addr.parse().map_err(|e| {
            ConfigError::ValidationError(format!("listen_addr {:?}: {}", self.listen_addr, e))
        })
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_upload_mb() -> usize {
    1024
}

/// Chunking, replication and key derivation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Plaintext bytes per chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Replicas per chunk for new files
    #[serde(default = "default_replication_factor")]
    pub replication_factor: u32,

    #[serde(default = "default_pbkdf2_iterations")]
    pub pbkdf2_iterations: u32,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            replication_factor: default_replication_factor(),
            pbkdf2_iterations: default_pbkdf2_iterations(),
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_replication_factor() -> u32 {
    DEFAULT_REPLICATION_FACTOR
}

fn default_pbkdf2_iterations() -> u32 {
    DEFAULT_PBKDF2_ITERATIONS
}

/// Node health monitor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSettings {
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval_secs(),
        }
    }
}

impl HealthSettings {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

fn default_check_interval_secs() -> u64 {
    10
}

/// Repair loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairSettings {
    #[serde(default = "default_repair_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_true")]
    pub verify_checksums: bool,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for RepairSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_repair_interval_secs(),
            verify_checksums: true,
            enabled: true,
        }
    }
}

fn default_repair_interval_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

/// Storage node client timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeClientSettings {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for NodeClientSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    2_000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

/// Metadata database settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// PostgreSQL URL; unset selects the in-memory store
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

fn default_max_connections() -> u32 {
    10
}

/// A statically configured storage node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: String,
    pub host: String,
    pub port: u16,
}

/// Parse `id=host:port,id=host:port`.
pub fn parse_node_list(value: &str) -> Result<Vec<NodeSpec>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let invalid = || {
                ConfigError::ValidationError(format!(
                    "node entry {:?} is not of the form id=host:port",
                    entry
                ))
            };
            let (id, addr) = entry.split_once('=').ok_or_else(invalid)?;
            let (host, port) = addr.rsplit_once(':').ok_or_else(invalid)?;
            let port = port.parse().map_err(|_| invalid())?;
            Ok(NodeSpec {
                id: id.trim().to_string(),
                host: host.trim().to_string(),
                port,
            })
        })
        .collect()
}

impl GatewayConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration with fallback to defaults when the file is absent
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    /// Apply `CHUNKVAULT_*` environment variable overrides
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key/value source.
    pub fn with_overrides_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        fn parsed<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::ValidationError(format!("{} has an invalid value", key)))
        }

        if let Some(v) = lookup("CHUNKVAULT_LISTEN_ADDR") {
            self.server.listen_addr = v;
        }
        if let Some(v) = lookup("CHUNKVAULT_REPLICATION_FACTOR") {
            self.storage.replication_factor = parsed("CHUNKVAULT_REPLICATION_FACTOR", v)?;
        }
        if let Some(v) = lookup("CHUNKVAULT_CHUNK_SIZE") {
            self.storage.chunk_size = parsed("CHUNKVAULT_CHUNK_SIZE", v)?;
        }
        if let Some(v) = lookup("CHUNKVAULT_PBKDF2_ITERATIONS") {
            self.storage.pbkdf2_iterations = parsed("CHUNKVAULT_PBKDF2_ITERATIONS", v)?;
        }
        if let Some(v) = lookup("CHUNKVAULT_HEALTH_INTERVAL_SECS") {
            self.health.check_interval_secs = parsed("CHUNKVAULT_HEALTH_INTERVAL_SECS", v)?;
        }
        if let Some(v) = lookup("CHUNKVAULT_REPAIR_INTERVAL_SECS") {
            self.repair.interval_secs = parsed("CHUNKVAULT_REPAIR_INTERVAL_SECS", v)?;
        }
        if let Some(v) = lookup("CHUNKVAULT_DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Some(v) = lookup("CHUNKVAULT_NODES") {
            self.nodes = parse_node_list(&v)?;
        }
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

        if self.storage.replication_factor < 1 {
            return invalid("replication_factor must be at least 1");
        }
        if self.storage.chunk_size == 0 {
            return invalid("chunk_size must be greater than 0");
        }
        if self.storage.pbkdf2_iterations < MIN_PBKDF2_ITERATIONS {
            return Err(ConfigError::ValidationError(format!(
                "pbkdf2_iterations must be at least {}",
                MIN_PBKDF2_ITERATIONS
            )));
        }
        if self.health.check_interval_secs == 0 || self.repair.interval_secs == 0 {
            return invalid("intervals must be greater than 0");
        }
        if self.node_client.connect_timeout_ms == 0 || self.node_client.request_timeout_ms == 0 {
            return invalid("node client timeouts must be greater than 0");
        }
        if self.server.max_upload_mb == 0 {
            return invalid("max_upload_mb must be at least 1");
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if node.id.trim().is_empty() {
                return invalid("node ids cannot be empty");
            }
            if !seen.insert(node.id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate node id {:?}",
                    node.id
                )));
            }
        }

        self.server.socket_addr()?;
        Ok(())
    }

    pub fn node_client_config(&self) -> NodeClientConfig {
        let request_timeout = Duration::from_millis(self.node_client.request_timeout_ms);
        NodeClientConfig {
            connect_timeout: Duration::from_millis(self.node_client.connect_timeout_ms),
            request_timeout,
            probe_timeout: request_timeout,
        }
    }

    pub fn rebalancer_config(&self) -> RebalancerConfig {
        RebalancerConfig {
            repair_interval_secs: self.repair.interval_secs,
            verify_checksums: self.repair.verify_checksums,
            enabled: self.repair.enabled,
        }
    }

    /// `None` selects the in-memory metadata store.
    pub fn db_config(&self) -> Option<DbConfig> {
        self.database.url.as_ref().map(|url| DbConfig {
            max_connections: self.database.max_connections,
            ..DbConfig::with_url(url.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.storage.replication_factor, 3);
        assert_eq!(config.storage.chunk_size, 4 * 1024 * 1024);
        assert_eq!(config.storage.pbkdf2_iterations, 100_000);
        assert_eq!(config.health.check_interval(), Duration::from_secs(10));
        assert_eq!(config.rebalancer_config().repair_interval(), Duration::from_secs(30));
        assert_eq!(config.server.socket_addr().unwrap().port(), 8080);
        assert!(config.db_config().is_none());

        let client = config.node_client_config();
        assert_eq!(client.connect_timeout, Duration::from_secs(2));
        assert_eq!(client.request_timeout, Duration::from_secs(10));

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let toml = r#"
            [storage]
            replication_factor = 2

            [database]
            url = "postgres://db/chunkvault"

            [[nodes]]
            id = "node-1"
            host = "10.0.0.1"
            port = 9001

            [[nodes]]
            id = "node-2"
            host = "10.0.0.2"
            port = 9001
        "#;

        let config: GatewayConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.storage.replication_factor, 2);
        assert_eq!(config.storage.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.nodes.len(), 2);
        assert_eq!(config.nodes[1].host, "10.0.0.2");
        assert_eq!(
            config.db_config().unwrap().url,
            "postgres://db/chunkvault"
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("CHUNKVAULT_REPLICATION_FACTOR", "2"),
            ("CHUNKVAULT_REPAIR_INTERVAL_SECS", "5"),
            ("CHUNKVAULT_NODES", "a=localhost:9001, b=10.1.1.1:9002"),
        ]);
        let config = GatewayConfig::default()
            .with_overrides_from(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.storage.replication_factor, 2);
        assert_eq!(config.repair.interval_secs, 5);
        assert_eq!(
            config.rebalancer_config().repair_interval(),
            Duration::from_secs(5)
        );
        assert_eq!(
            config.nodes,
            vec![
                NodeSpec {
                    id: "a".into(),
                    host: "localhost".into(),
                    port: 9001
                },
                NodeSpec {
                    id: "b".into(),
                    host: "10.1.1.1".into(),
                    port: 9002
                },
            ]
        );

        let bad = GatewayConfig::default()
            .with_overrides_from(|k| (k == "CHUNKVAULT_CHUNK_SIZE").then(|| "big".to_string()));
        assert!(bad.is_err());
    }

    #[test]
    fn test_parse_node_list_rejects_garbage() {
        assert!(parse_node_list("").unwrap().is_empty());
        assert!(parse_node_list("node-1").is_err());
        assert!(parse_node_list("node-1=host").is_err());
        assert!(parse_node_list("node-1=host:port").is_err());
    }

    #[test]
    fn test_validation() {
        let mut config = GatewayConfig::default();
        config.storage.replication_factor = 0;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.storage.chunk_size = 0;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.storage.pbkdf2_iterations = 1_000;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.health.check_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.nodes = vec![
            NodeSpec {
                id: "n".into(),
                host: "a".into(),
                port: 1,
            },
            NodeSpec {
                id: "n".into(),
                host: "b".into(),
                port: 2,
            },
        ];
        assert!(config.validate().is_err());
    }
}

//! Configuration management for the ChunkVault storage node
//!
//! Supports loading from TOML files, environment variables and CLI flags,
//! applied in that order.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
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

/// Complete node configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub node: NodeIdentity,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub server: ServerSettings,
}

impl NodeConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: NodeConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with fallback to defaults when the file is absent.
    ///
    /// A file that exists but cannot be read or parsed is an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    /// Apply `NODE_*` environment variable overrides
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key/value source.
    pub fn with_overrides_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(id) = lookup("NODE_ID") {
            self.node.id = id;
        }
        if let Some(dir) = lookup("NODE_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(addr) = lookup("NODE_LISTEN_ADDR") {
            self.server.listen_addr = addr;
        }
        if let Some(mb) = lookup("NODE_MAX_BLOB_MB") {
            self.server.max_blob_mb = mb.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!("invalid NODE_MAX_BLOB_MB: {:?}", mb))
            })?;
        }
        Ok(self)
    }

    /// Override config with CLI arguments
    pub fn with_overrides(
        mut self,
        node_id: Option<String>,
        data_dir: Option<PathBuf>,
        listen_addr: Option<String>,
    ) -> Self {
        if let Some(id) = node_id {
            self.node.id = id;
        }
        if let Some(dir) = data_dir {
            self.storage.data_dir = dir;
        }
        if let Some(addr) = listen_addr {
            self.server.listen_addr = addr;
        }
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "node id cannot be empty".to_string(),
            ));
        }
        if self.server.max_blob_mb == 0 {
            return Err(ConfigError::ValidationError(
                "max_blob_mb must be at least 1".to_string(),
            ));
        }
        self.server.socket_addr()?;
        Ok(())
    }
}

/// Node identity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// Stable operator-assigned id, must match the orchestrator's node list
    #[serde(default = "default_node_id")]
    pub id: String,
}

impl Default for NodeIdentity {
    fn default() -> Self {
        Self {
            id: default_node_id(),
        }
    }
}

fn default_node_id() -> String {
    "node-1".to_string()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Directory holding `<blobId>.enc` files
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data/chunks")
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Largest accepted blob body in MiB
    #[serde(default = "default_max_blob_mb")]
    pub max_blob_mb: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_blob_mb: default_max_blob_mb(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_addr.parse().map_err(|e| {
            ConfigError::ValidationError(format!("listen_addr {:?}: {}", self.listen_addr, e))
        })
    }

    pub fn max_blob_bytes(&self) -> usize {
        self.max_blob_mb * 1024 * 1024
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:9001".to_string()
}

fn default_max_blob_mb() -> usize {
    64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert_eq!(config.node.id, "node-1");
        assert_eq!(config.server.max_blob_bytes(), 64 * 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
            [node]
            id = "node-7"

            [storage]
            data_dir = "/var/lib/chunkvault/node-7"

            [server]
            listen_addr = "127.0.0.1:9107"
        "#;

        let config: NodeConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.node.id, "node-7");
        assert_eq!(
            config.storage.data_dir,
            PathBuf::from("/var/lib/chunkvault/node-7")
        );
        assert_eq!(config.server.socket_addr().unwrap().port(), 9107);
        assert_eq!(config.server.max_blob_mb, 64);
    }

    #[test]
    fn test_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("node.toml");
        std::fs::write(&path, "[node]\nid = \"disk-node\"\n").unwrap();

        let config = NodeConfig::load_or_default(&path).unwrap();
        assert_eq!(config.node.id, "disk-node");

        let missing = NodeConfig::load_or_default(temp.path().join("absent.toml")).unwrap();
        assert_eq!(missing.node.id, "node-1");
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("node.toml");
        std::fs::write(&path, "[node\nid = disk-node").unwrap();

        let err = NodeConfig::load_or_default(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)), "{:?}", err);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("NODE_ID", "node-3"),
            ("NODE_DATA_DIR", "/srv/blobs"),
            ("NODE_MAX_BLOB_MB", "128"),
        ]
        .into_iter()
        .collect();

        let config = NodeConfig::default()
            .with_overrides_from(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.node.id, "node-3");
        assert_eq!(config.storage.data_dir, PathBuf::from("/srv/blobs"));
        assert_eq!(config.server.max_blob_mb, 128);
        assert_eq!(config.server.listen_addr, "0.0.0.0:9001");
    }

    #[test]
    fn test_non_numeric_blob_limit_is_rejected() {
        let err = NodeConfig::default()
            .with_overrides_from(|key| (key == "NODE_MAX_BLOB_MB").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)), "{:?}", err);
    }

    #[test]
    fn test_config_validation() {
        let mut config = NodeConfig::default();
        config.server.listen_addr = "not an address".into();
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.node.id = " ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_overrides() {
        let config = NodeConfig::default().with_overrides(
            Some("node-9".into()),
            Some(PathBuf::from("/custom/path")),
            Some("127.0.0.1:9999".into()),
        );

        assert_eq!(config.node.id, "node-9");
        assert_eq!(config.storage.data_dir, PathBuf::from("/custom/path"));
        assert_eq!(config.server.listen_addr, "127.0.0.1:9999");
    }
}

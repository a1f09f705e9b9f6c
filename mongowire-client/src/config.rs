//! Client configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via MONGOWIRE_CONFIG)
//! 3. Environment variables

use crate::connection::{ConnectionConfig, DEFAULT_READ_BUFFER_SIZE};
use crate::pool::DEFAULT_POOL_MAX_SIZE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Network configuration.
    pub network: NetworkConfig,
    /// Replica-set discovery bounds.
    pub discovery: DiscoveryConfig,
    /// Per-member stream pool.
    pub pool: PoolConfig,
}

impl ClientConfig {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("MONGOWIRE_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: ClientConfig = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        self.network.apply_env_overrides();
        self.discovery.apply_env_overrides();
        self.pool.apply_env_overrides();
    }

    /// Rejects settings no connection could be made with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.seed.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "network.seed must not be empty".to_string(),
            ));
        }
        if self.pool.max_size == 0 {
            return Err(ConfigError::ValidationError(
                "pool.max_size must be at least 1".to_string(),
            ));
        }
        if self.discovery.max_members == 0 {
            return Err(ConfigError::ValidationError(
                "discovery.max_members must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Connection settings derived from the network section.
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::new()
            .with_connect_timeout(self.network.connect_timeout())
            .with_request_timeout(self.network.request_timeout())
            .with_read_buffer_size(self.network.read_buffer_size)
    }

    /// Returns a copy with a different seed.
    pub fn with_seed(mut self, seed: impl Into<String>) -> Self {
        self.network.seed = seed.into();
        self
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address discovery starts from.
    pub seed: String,
    /// Dial timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Reply timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Socket read buffer size in bytes.
    pub read_buffer_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            seed: "127.0.0.1:27017".to_string(),
            connect_timeout_ms: 10_000,
            request_timeout_ms: 30_000,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl NetworkConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(seed) = std::env::var("MONGOWIRE_SEED") {
            if !seed.is_empty() {
                self.seed = seed;
            }
        }

        if let Ok(timeout) = std::env::var("MONGOWIRE_CONNECT_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse() {
                self.connect_timeout_ms = ms;
            }
        }

        if let Ok(timeout) = std::env::var("MONGOWIRE_REQUEST_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse() {
                self.request_timeout_ms = ms;
            }
        }

        if let Ok(size) = std::env::var("MONGOWIRE_READ_BUFFER_SIZE") {
            if let Ok(n) = size.parse() {
                self.read_buffer_size = n;
            }
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Bounds on the discovery walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Hosts first seen deeper than this many hops from the seed are not dialed.
    pub max_depth: usize,
    /// Stop registering members past this count.
    pub max_members: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_depth: 8,
            max_members: 50,
        }
    }
}

impl DiscoveryConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(depth) = std::env::var("MONGOWIRE_DISCOVERY_MAX_DEPTH") {
            if let Ok(n) = depth.parse() {
                self.max_depth = n;
            }
        }

        if let Ok(max) = std::env::var("MONGOWIRE_DISCOVERY_MAX_MEMBERS") {
            if let Ok(n) = max.parse() {
                self.max_members = n;
            }
        }
    }
}

/// Stream pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum open streams per member.
    pub max_size: usize,
    /// Streams dialed eagerly when a member is registered.
    pub initial_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_POOL_MAX_SIZE,
            initial_size: 0,
        }
    }
}

impl PoolConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(max) = std::env::var("MONGOWIRE_POOL_MAX_SIZE") {
            if let Ok(n) = max.parse() {
                self.max_size = n;
            }
        }

        if let Ok(initial) = std::env::var("MONGOWIRE_POOL_INITIAL_SIZE") {
            if let Ok(n) = initial.parse() {
                self.initial_size = n;
            }
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.network.seed, "127.0.0.1:27017");
        assert_eq!(config.network.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.network.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.discovery.max_depth, 8);
        assert_eq!(config.discovery.max_members, 50);
        assert_eq!(config.pool.max_size, 30);
        assert_eq!(config.pool.initial_size, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "network:\n  seed: \"rs0-a:27018\"\n  request_timeout_ms: 500\npool:\n  max_size: 4"
        )
        .unwrap();

        let config = ClientConfig::from_file(file.path()).unwrap();
        assert_eq!(config.network.seed, "rs0-a:27018");
        assert_eq!(config.network.request_timeout(), Duration::from_millis(500));
        // Unset fields keep their defaults.
        assert_eq!(config.network.connect_timeout_ms, 10_000);
        assert_eq!(config.pool.max_size, 4);
        assert_eq!(config.discovery.max_members, 50);
    }

    #[test]
    fn test_missing_file() {
        let err = ClientConfig::from_file("/nonexistent/mongowire.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::IoError(..)));
    }

    #[test]
    fn test_invalid_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "network: [not, a, map]").unwrap();
        let err = ClientConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(..)));
        assert!(err.to_string().contains("failed to parse"));
    }

    #[test]
    fn test_validation() {
        let mut config = ClientConfig::default();
        config.pool.max_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let config = ClientConfig::default().with_seed("  ");
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.discovery.max_members = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_connection_config() {
        let mut config = ClientConfig::default();
        config.network.read_buffer_size = 1;
        let conn = config.connection_config();
        assert_eq!(conn.read_buffer_size, crate::connection::MIN_READ_BUFFER_SIZE);
        assert_eq!(conn.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = ClientConfig::default().with_seed("db:1");
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: ClientConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.network.seed, "db:1");
    }

    #[test]
    fn test_env_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "network:\n  seed: \"file-host:27018\"\npool:\n  max_size: 4"
        )
        .unwrap();

        std::env::set_var("MONGOWIRE_CONFIG", file.path());
        std::env::set_var("MONGOWIRE_SEED", "env-host:27019");
        std::env::set_var("MONGOWIRE_POOL_INITIAL_SIZE", "2");
        let loaded = ClientConfig::load();
        std::env::remove_var("MONGOWIRE_CONFIG");
        std::env::remove_var("MONGOWIRE_SEED");
        std::env::remove_var("MONGOWIRE_POOL_INITIAL_SIZE");

        let config = loaded.unwrap();
        assert_eq!(config.network.seed, "env-host:27019");
        assert_eq!(config.pool.max_size, 4);
        assert_eq!(config.pool.initial_size, 2);
        assert_eq!(config.discovery.max_members, 50);
    }
}

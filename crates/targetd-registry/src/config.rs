//! Process configuration for the registry server.
//!
//! Settings come from an optional YAML file; the binary then applies
//! environment and command-line overrides on top.
//!
//! ```yaml
//! db_file: /var/lib/targetd/targets.db
//! auth_token: s3cret
//! port: 8081
//! atomic_register: false
//! ```

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::storage::StoreOptions;
use crate::transport::{TransportConfig, DEFAULT_PORT};

/// Top-level registry configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Database file holding every namespace.
    pub db_file: PathBuf,

    /// Shared secret expected in the `Authorization` header.
    #[serde(skip_serializing)]
    pub auth_token: String,

    /// TCP port (ignored when `unix_socket` is set).
    pub port: u16,

    /// Interface to bind the TCP listener on.
    pub bind_address: String,

    /// Serve on a Unix domain socket instead of TCP.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unix_socket: Option<PathBuf>,

    /// Create the namespace and write the entry in one transaction.
    pub atomic_register: bool,

    /// SQLite busy timeout in milliseconds.
    pub busy_timeout_ms: u64,

    /// Number of read-only store connections.
    pub read_pool_size: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            db_file: default_db_file(),
            auth_token: String::new(),
            port: DEFAULT_PORT,
            bind_address: default_bind_address(),
            unix_socket: None,
            atomic_register: false,
            busy_timeout_ms: default_busy_timeout_ms(),
            read_pool_size: default_read_pool_size(),
        }
    }
}

impl RegistryConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        Self::load_from_string(&content)
    }

    /// Load configuration from a YAML string
    pub fn load_from_string(content: &str) -> Result<Self> {
        let config: RegistryConfig =
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.db_file.as_os_str().is_empty() {
            return Err(anyhow!("db_file cannot be empty"));
        }

        if self.unix_socket.is_none() && self.port == 0 {
            return Err(anyhow!("Port must be between 1 and 65535, got: {}", self.port));
        }

        if self.busy_timeout_ms == 0 {
            return Err(anyhow!("busy_timeout_ms must be greater than 0"));
        }

        if self.read_pool_size == 0 {
            return Err(anyhow!("read_pool_size must be greater than 0"));
        }

        #[cfg(not(unix))]
        {
            if self.unix_socket.is_some() {
                return Err(anyhow!("unix_socket is only supported on Unix platforms"));
            }
        }

        Ok(())
    }

    /// Listener derived from `unix_socket`, `bind_address` and `port`.
    pub fn transport(&self) -> TransportConfig {
        #[cfg(unix)]
        {
            if let Some(path) = &self.unix_socket {
                return TransportConfig::unix_socket(path);
            }
        }

        TransportConfig::tcp_on(self.bind_address.clone(), self.port)
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
            read_pool_size: self.read_pool_size,
        }
    }
}

// Default value functions
fn default_db_file() -> PathBuf {
    PathBuf::from("targets.db")
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_read_pool_size() -> usize {
    4
}

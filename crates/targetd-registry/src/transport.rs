//! Listener configuration for the registry server.
//!
//! # Rust Learning Note
//!
//! The Unix socket variant only exists on Unix targets:
//!
//! ```text
//! #[cfg(unix)]
//! UnixSocket { path: PathBuf },
//! ```
//!
//! On other platforms the variant is not compiled at all, so a `match` on
//! `TransportConfig` there has nothing to forget.

#[cfg(unix)]
use std::path::PathBuf;

/// Default TCP port the registry listens on.
pub const DEFAULT_PORT: u16 = 8081;

/// Where the registry server accepts connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportConfig {
    /// TCP socket on `host:port`.
    Tcp { host: String, port: u16 },

    /// Unix domain socket (Unix only).
    #[cfg(unix)]
    UnixSocket { path: PathBuf },
}

impl TransportConfig {
    /// Creates a TCP transport on all interfaces.
    pub fn tcp(port: u16) -> Self {
        Self::Tcp {
            host: "0.0.0.0".to_string(),
            port,
        }
    }

    /// Creates a TCP transport on a specific interface.
    pub fn tcp_on(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Creates a Unix domain socket config (Unix only).
    #[cfg(unix)]
    pub fn unix_socket(path: impl Into<PathBuf>) -> Self {
        Self::UnixSocket { path: path.into() }
    }

    /// Returns a human-readable description of the transport.
    pub fn describe(&self) -> String {
        match self {
            TransportConfig::Tcp { host, port } => format!("TCP on {}:{}", host, port),
            #[cfg(unix)]
            TransportConfig::UnixSocket { path } => {
                format!("Unix socket at {}", path.display())
            }
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::tcp(DEFAULT_PORT)
    }
}

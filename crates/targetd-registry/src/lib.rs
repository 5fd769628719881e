//! # targetd registry
//!
//! A small durable registry of "targets": opaque payloads filed under a
//! kind and a key, managed over HTTP.
//!
//! This crate provides:
//! - A SQLite-backed store with one namespace per kind
//! - The registry service (register, unregister, list)
//! - The HTTP API with shared-token authorization
//! - Transport selection (TCP or Unix domain socket)
//! - The `targetd` server executable

pub mod api;
pub mod auth;
pub mod config;
pub mod server;
pub mod service;
pub mod storage;
pub mod transport;

// Re-export commonly used items
pub use auth::AuthToken;
pub use config::RegistryConfig;
pub use server::RegistryServer;
pub use service::RegistryService;
pub use storage::{RegistryStore, SqliteStore, StoreOptions};
pub use transport::TransportConfig;

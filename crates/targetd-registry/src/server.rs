//! Registry server: owns the store, the service and the listener.
//!
//! # Rust Learning Note
//!
//! The store is opened exactly once, in [`RegistryServer::new`], and handed
//! to the service as an `Arc<dyn RegistryStore>`. Handlers reach it only
//! through the router state; there is no global handle.

use axum::Router;
use std::future::Future;
use std::sync::Arc;
use targetd_common::{Result, ResultExt};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[cfg(unix)]
use tokio::net::UnixListener;

use crate::{
    api::create_router,
    auth::AuthToken,
    config::RegistryConfig,
    service::RegistryService,
    storage::{RegistryStore, SqliteStore},
    transport::TransportConfig,
};

/// Target registry server.
pub struct RegistryServer {
    service: RegistryService,
    transport: TransportConfig,
    router: Router,
}

impl RegistryServer {
    /// Opens the store named by `config` and wires up the HTTP router.
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let store = SqliteStore::open(&config.db_file, config.store_options())
            .context(format!("Could not open database {}", config.db_file.display()))?;

        let service = RegistryService::new(Arc::new(store))
            .with_atomic_register(config.atomic_register);

        let token = AuthToken::new(&config.auth_token);
        if token.is_empty() {
            warn!("No auth token configured; every registry request will be rejected");
        }

        Ok(Self::from_parts(service, token, config.transport()))
    }

    /// Builds a server around an existing store.
    pub fn with_store(
        store: Arc<dyn RegistryStore>,
        token: AuthToken,
        transport: TransportConfig,
    ) -> Self {
        Self::from_parts(RegistryService::new(store), token, transport)
    }

    fn from_parts(service: RegistryService, token: AuthToken, transport: TransportConfig) -> Self {
        let router = create_router(service.clone(), token);

        Self {
            service,
            transport,
            router,
        }
    }

    /// Returns the registry service.
    pub fn service(&self) -> &RegistryService {
        &self.service
    }

    /// Returns a clone of the HTTP router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serves until SIGINT or SIGTERM.
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Serves until `shutdown` completes, then drains in-flight requests.
    ///
    /// In-flight store transactions always run to completion; a client
    /// disconnecting does not roll them back.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!("Starting registry server: {}", self.transport.describe());

        match self.transport.clone() {
            TransportConfig::Tcp { host, port } => {
                let addr = format!("{}:{}", host, port);
                let listener = TcpListener::bind(&addr)
                    .await
                    .map_err(targetd_common::Error::from)
                    .context(format!("Could not bind {}", addr))?;
                info!("Server listening on {}", listener.local_addr()?);

                axum::serve(listener, self.router)
                    .with_graceful_shutdown(shutdown)
                    .await?;
            }

            #[cfg(unix)]
            TransportConfig::UnixSocket { path } => {
                // Remove a stale socket file left by a previous run
                if path.exists() {
                    std::fs::remove_file(&path)?;
                }

                let listener = UnixListener::bind(&path)?;
                info!("Server listening on {}", path.display());

                axum::serve(listener, self.router)
                    .with_graceful_shutdown(shutdown)
                    .await?;
            }
        }

        info!("Registry server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    use tokio::signal;

    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                let _ = signal::ctrl_c().await;
                info!("Received Ctrl+C signal");
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM signal");
            }
            _ = signal::ctrl_c() => {
                info!("Received SIGINT signal");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
        info!("Received Ctrl+C signal");
    }
}

//! Standalone target registry server.
//!
//! ```text
//! targetd                                  # targets.db, port 8081
//! targetd --config /etc/targetd.yaml       # YAML config
//! DB_FILE=/data/t.db AUTH_TOKEN=s3cret targetd --port 9000
//! targetd --unix-socket /tmp/targetd.sock  # Unix socket (Unix only)
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use targetd_registry::{RegistryConfig, RegistryServer};

/// targetd - durable registry of targets grouped by kind
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (YAML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Database file (overrides config)
    #[arg(long, env = "DB_FILE", value_name = "FILE")]
    db_file: Option<PathBuf>,

    /// Shared secret expected in the Authorization header (overrides config)
    #[arg(long, env = "AUTH_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Address to bind the TCP listener on (overrides config)
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,

    /// Serve on a Unix domain socket instead of TCP
    #[arg(long, value_name = "PATH")]
    unix_socket: Option<PathBuf>,

    /// Create the namespace and store the entry in a single transaction
    #[arg(long)]
    atomic_register: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    initialize_logging(args.debug);

    let config = load_config(args)?;
    info!("Database file: {}", config.db_file.display());

    let server = RegistryServer::new(&config)?;
    info!("Database initialization complete - starting HTTP server now.");

    server.run().await?;

    Ok(())
}

fn load_config(args: Args) -> Result<RegistryConfig> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Config file: {}", path.display());
            RegistryConfig::load_from_file(path)?
        }
        None => RegistryConfig::default(),
    };

    if let Some(db_file) = args.db_file {
        config.db_file = db_file;
    }
    if let Some(auth_token) = args.auth_token {
        config.auth_token = auth_token;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(unix_socket) = args.unix_socket {
        config.unix_socket = Some(unix_socket);
    }
    if args.atomic_register {
        config.atomic_register = true;
    }

    config.validate()?;
    Ok(config)
}

fn initialize_logging(debug: bool) {
    let level = if debug { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();
}

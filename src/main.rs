//! l4-relay binary entry point.
//!
//! # Usage
//!
//! ```bash
//! # Forward :8080 to localhost:80
//! l4-relay
//!
//! # Forward to a database, log payload previews, relay UDP on :5433
//! l4-relay --listen-port 5432 --target-host 10.0.0.10 --target-port 5432 \
//!     --log-data --enable-udp
//!
//! # Environment overrides sit between the config file and the flags;
//! # a `.env` file in the working directory is read as well
//! TARGET_HOST=10.0.0.10 TARGET_PORT=5432 l4-relay -c /etc/l4-relay.toml
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{info, warn};

use l4_relay::cli;
use l4_relay::config::{apply_env, apply_env_file, ConfigLoader, RelayConfig, DEFAULT_ENV_FILE};
use l4_relay::logging;
use l4_relay::relay::RelayServer;

/// Defaults, then the config file, then `.env` and the environment, then flags.
fn build_config(matches: &clap::ArgMatches) -> Result<RelayConfig> {
    let mut config = match cli::config_path(matches) {
        Some(path) => ConfigLoader::new()
            .load(&path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => RelayConfig::default(),
    };
    if Path::new(DEFAULT_ENV_FILE).is_file() {
        apply_env_file(&mut config, DEFAULT_ENV_FILE).context("Invalid environment override")?;
    } else {
        apply_env(&mut config).context("Invalid environment override")?;
    }
    cli::apply_matches(matches, &mut config);
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli::command().get_matches();
    let config = build_config(&matches)?;

    logging::init(&config.logging).context("Failed to initialize logging")?;

    info!("l4-relay v{}", l4_relay::VERSION);
    info!("Log level: {}", config.logging.level);
    if Path::new(DEFAULT_ENV_FILE).is_file() {
        info!("Environment file: {}", DEFAULT_ENV_FILE);
    }
    match &config.logging.file {
        Some(path) => info!("Logging to file: {}", path.display()),
        None => info!("Logging to stdout only"),
    }
    if config.logging.full_dump {
        info!("Full data logging enabled (entire payloads)");
    } else if config.logging.log_data {
        info!("Data logging enabled (previews)");
    }

    let server = RelayServer::bind(config.clone())
        .await
        .context("Failed to start relay")?;
    let tcp_addr = server.local_addr().context("Failed to read listen address")?;
    info!("TCP proxy listening on {}", tcp_addr);
    info!("Forwarding to {}", config.target);
    if let Some(udp_addr) = server.udp_local_addr() {
        info!("UDP proxy listening on {}", udp_addr);
    }

    let handle = server.spawn();

    signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    warn!("Shutdown signal received");

    let metrics = handle.metrics().snapshot();
    handle.shutdown().await;
    info!(%metrics, "Relay stopped");

    Ok(())
}

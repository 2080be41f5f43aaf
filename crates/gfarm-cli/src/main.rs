//! gfarm-gateway - HTTP gateway for the Gfarm distributed filesystem

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gfarm_api::{ApiServer, ApiState};
use gfarm_cli::{Cli, Commands};
use gfarm_config::{validate, GatewayConfig, LockSettings};
use gfarm_grid::{GridClient, GridConfig};
use gfarm_lock::{DistributedLock, LockConfig, RedisLockStore};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, host, port } => {
            let mut config = GatewayConfig::load(config.as_deref())?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            init_tracing(cli.verbose, &config);
            serve(config).await
        }
        Commands::CheckConfig { config } => check_config(config.as_deref()),
    }
}

/// Initialize tracing. `-v` repetition wins over the configured level;
/// `RUST_LOG` wins over both.
fn init_tracing(verbose: u8, config: &GatewayConfig) {
    let filter = match verbose {
        0 => config.log.level.as_str(),
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve(config: GatewayConfig) -> Result<()> {
    let report = validate(&config);
    for warning in &report.warnings {
        warn!("config: {warning}");
    }
    if !report.is_valid() {
        for e in &report.errors {
            error!("config: {e}");
        }
        anyhow::bail!("invalid configuration");
    }

    let grid = Arc::new(GridClient::new(GridConfig {
        helper_script: config.auth.helper_script.clone(),
        ..GridConfig::default()
    }));

    let lock = match &config.lock.url {
        Some(url) => {
            let store = RedisLockStore::connect(url)
                .await
                .with_context(|| format!("connecting to lock store at {url}"))?;
            Some(Arc::new(DistributedLock::new(
                Arc::new(store),
                lock_config(&config.lock),
            )))
        }
        None => None,
    };

    let state = ApiState::new(grid, lock, config.auth.allow_anonymous);
    let server = ApiServer::new(config.server.clone(), state);
    server.start().await.context("running gateway")?;
    Ok(())
}

fn lock_config(settings: &LockSettings) -> LockConfig {
    LockConfig {
        prefix: settings.prefix.clone(),
        ttl: Duration::from_secs(settings.ttl_secs),
        retry_count: settings.retry_count,
        retry_interval: Duration::from_millis(settings.retry_interval_ms),
    }
}

fn check_config(path: Option<&Path>) -> Result<()> {
    let config = GatewayConfig::load(path)?;
    let report = validate(&config);

    println!("{}", toml::to_string_pretty(&config)?);
    for warning in &report.warnings {
        println!("warning: {warning}");
    }
    if !report.is_valid() {
        for e in &report.errors {
            println!("error: {e}");
        }
        anyhow::bail!("invalid configuration");
    }
    Ok(())
}

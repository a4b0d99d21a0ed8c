use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod cli;
mod records;

use mirage_common::{RelayConfig, RelayConfigPatch};
use mirage_core::{Core, UpstreamClientConfig, WreqUpstreamClient};
use mirage_storage::{FsObjectStore, SharedObjectStore};

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("mirage failed: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut patch = match cli.config.as_deref() {
        Some(path) => RelayConfigPatch::from_json_file(path)?,
        None => RelayConfigPatch::default(),
    };
    patch.overlay(cli.serve.into_patch());
    let config = Arc::new(patch.into_config()?);

    let store: SharedObjectStore = Arc::new(FsObjectStore::new(&config.data_dir));

    match cli.command {
        Some(Command::Records { action }) => records::run(store.as_ref(), action).await,
        None => serve(config, store).await,
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("mirage=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn serve(config: Arc<RelayConfig>, store: SharedObjectStore) -> anyhow::Result<()> {
    info!(
        bind = %config.bind_addr(),
        target_host = %config.target_host,
        mask_errors = config.mask_errors,
        data_dir = %config.data_dir,
        proxy = %config.proxy.as_deref().unwrap_or(""),
        health_check = config.health_check_key.is_some(),
        "config loaded"
    );

    let client = WreqUpstreamClient::new(UpstreamClientConfig::from_relay(&config))
        .context("build upstream client")?;
    let core = Core::new(config.clone(), Arc::new(client), store);

    let shutdown = CancellationToken::new();
    let health = tokio::spawn(core.health_checker().run(shutdown.child_token()));

    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("bind {}", config.bind_addr()))?;
    info!(addr = %config.bind_addr(), "listening");

    let signal = shutdown.clone();
    axum::serve(listener, core.router())
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = signal.cancelled() => {}
            }
            info!("shutdown requested");
        })
        .await?;

    shutdown.cancel();
    if let Err(err) = health.await {
        warn!(error = %err, "health checker task ended abnormally");
    }

    let background = core.background();
    let pending = background.len();
    if background.drain(config.drain_timeout()).await {
        info!(drained = pending, "background work finished");
    }
    Ok(())
}

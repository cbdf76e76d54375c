//! `fida-server` — HTTP service exposing the multi-tenant event ledger:
//! issuance, verification, export, Merkle proofs, and platform/tenant
//! administration.

use std::time::Duration;

use clap::Parser;
use fida_core::keys::KeyVault;
use fida_core::LedgerEngine;
use fida_server::{app, AppState, Metrics};
use fida_spec::Config;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// `fida-server` command line.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase output verbosity.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Override log level (e.g. info, debug, trace).
    #[arg(long, env = "FIDA_LOG_LEVEL")]
    log_level: Option<String>,
    /// HTTP bind address.
    #[arg(long, env = "FIDA_BIND_ADDR", default_value = "0.0.0.0:8080")]
    bind_addr: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = cli
        .log_level
        .as_deref()
        .map(|lvl| lvl.to_ascii_uppercase())
        .map(|lvl| match lvl.as_str() {
            "TRACE" => Level::TRACE,
            "DEBUG" => Level::DEBUG,
            "INFO" => Level::INFO,
            "WARN" => Level::WARN,
            "ERROR" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or_else(|| match cli.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        });
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_env_filter(env_filter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::from_env()?;
    let store = fida_store::Store::open(&config.database_path)
        .map_err(|e| anyhow::anyhow!("failed to open store at {}: {e}", config.database_path))?;
    let vault = KeyVault::new(&config.master_key_b64)?;
    let engine = LedgerEngine::new(store, vault, config.checkpoint_batch);
    let metrics = Metrics::new();
    let state = AppState::new(engine, config, metrics);

    tokio::spawn(rate_limiter_sweep(state.clone()));

    let listener = tokio::net::TcpListener::bind(&cli.bind_addr).await?;
    info!("fida-server listening on {}", cli.bind_addr);
    axum::serve(listener, app(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Periodically drops idle per-key rate-limit buckets so a long-lived
/// deployment doesn't accumulate one bucket per key id forever.
async fn rate_limiter_sweep(state: AppState) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        state.rate_limiter().retain_recent();
    }
}

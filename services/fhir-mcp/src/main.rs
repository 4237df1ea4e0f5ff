//! FHIR MCP server
//!
//! Single-binary Rust service that:
//! 1. Loads OAuth and API settings
//! 2. Restores a persisted credential, if any
//! 3. Serves assistant tool calls as JSON-RPC over stdin/stdout
//! 4. Forwards each call to the FHIR API with a live bearer token

mod config;
mod error;
mod server;
mod tools;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fhir_auth::CredentialManager;
use fhir_gateway::Gateway;

use crate::config::Config;
use crate::tools::Tools;

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs on stderr; stdout carries the protocol.
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    info!("starting fhir-mcp");

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        base_url = %config.api.base_url,
        token_endpoint = %config.oauth.token_endpoint,
        timeout_secs = config.api.timeout_secs,
        client_secret = config.oauth.client_secret.is_some(),
        "configuration loaded"
    );

    let client = reqwest::Client::builder()
        .timeout(config.timeout())
        .build()
        .context("failed to build HTTP client")?;

    let mut manager = CredentialManager::new(config.auth_config(), client);
    match config.token_store() {
        Some(store) => {
            info!(path = %store.path().display(), "token persistence enabled");
            manager = manager.with_store(store).await;
        }
        None => info!("token persistence disabled"),
    }

    let gateway = Gateway::new(Arc::new(manager))
        .with_query_path(config.api.query_path.clone())
        .with_probe_path(config.api.probe_path.clone())
        .with_timeout(config.timeout());
    let tools = Tools::new(Arc::new(gateway));

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    tokio::select! {
        result = server::serve(&tools, stdin, stdout) => {
            result.context("stdio transport failed")?;
        }
        _ = shutdown_signal() => {}
    }

    info!("fhir-mcp stopped");
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

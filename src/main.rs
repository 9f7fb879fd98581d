mod config;
mod error;
mod lang;
mod observability;
mod providers;
mod relay;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal;
use tracing::{error, info};

use crate::config::Config;
use crate::providers::{ProviderRegistry, build_http_client};
use crate::state::AppState;

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    observability::init(
        config
            .as_ref()
            .map(|c| c.log_format)
            .unwrap_or_default(),
    );

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!("Prompt relay starting...");
    info!(
        openai = config.openai.api_key.is_some(),
        openai_model = %config.openai.model,
        gemini = config.gemini.api_key.is_some(),
        gemini_model = %config.gemini.model,
        gemini_api_version = %config.gemini.api_version,
        upstream_timeout_secs = config.upstream_timeout.as_secs(),
        "providers"
    );

    let client = build_http_client(config.upstream_timeout)?;
    let providers = ProviderRegistry::from_config(&config, client);
    match providers.default_kind() {
        Some(kind) => info!("Default provider: {kind}"),
        None => info!("No provider key configured; POST requests will fail"),
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = Arc::new(AppState::new(config, providers));
    let app = relay::router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server running at http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}

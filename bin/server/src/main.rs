use std::process::ExitCode;
use std::sync::Arc;

use axum::Router;
use portcullis_server::auth::{self, ForwardAuth};
use portcullis_server::config::{ConfigError, LogFormat, ServerConfig};
use rootcause::prelude::ResultExt;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    // Logging is configured from the loaded config, so load errors go to stderr.
    let config = match ServerConfig::load() {
        Ok(config) => config,
        Err(report) => {
            eprintln!("{report}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config);

    let (listener, app) = match setup(&config).await {
        Ok(ready) => ready,
        Err(report) => {
            tracing::error!("{report}");
            eprintln!("{report}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "server error");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn init_tracing(config: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=warn", config.log_level)));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .init(),
    }
}

async fn setup(
    config: &ServerConfig,
) -> portcullis_core::Result<(TcpListener, Router), ConfigError> {
    let addr = config.socket_addr()?;
    let auth = Arc::new(ForwardAuth::from_config(config)?);
    tracing::info!(rules = config.rules.len(), "loaded configuration");

    let app = auth::router(auth).layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(addr)
        .await
        .context(ConfigError::Bind { addr })?;
    tracing::info!(%addr, "listening");

    Ok((listener, app))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

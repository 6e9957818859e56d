use std::path::PathBuf;

use review_backend::config::Config;
use review_backend::logging::init_tracing;
use review_backend::{create_app, seed};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = init_tracing(&config.log_level);

    let addr = config.bind_addr();
    let desktop_mode = config.desktop_mode;

    let (app, state) = match create_app(config).await {
        Ok(value) => value,
        Err(err) => {
            tracing::error!(error = %err, "review store could not be initialised");
            std::process::exit(1);
        }
    };

    if let Some(path) = std::env::var("VOCABULARY_SEED_PATH")
        .ok()
        .filter(|v| !v.trim().is_empty())
    {
        if let Err(err) = seed::seed_vocabulary_from_file(state.db(), &PathBuf::from(path)).await {
            tracing::warn!(error = %err, "vocabulary seed skipped");
        }
    }

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(%addr, error = %err, "failed to bind listener");
            std::process::exit(1);
        }
    };
    tracing::info!(%addr, desktop_mode, mode = ?state.db().mode(), "review-backend listening");

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %err, "server error");
    }

    tracing::info!("HTTP server stopped, closing store");
    state.db().close().await;
    tracing::info!("graceful shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

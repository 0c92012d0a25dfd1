#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use axum::Router;
use paddy_api::{RouterConfig, construct_router, state::State};
use paddy_model_provider::{BACKEND, Capability};
use std::sync::Arc;

mod config;
mod metrics;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    metrics::init_tracing();

    tracing::info!("Starting paddy disease detection service");

    let config = config::Config::from_env()?;
    if config.uses_default_secret() {
        tracing::warn!("SECRET_KEY not set, using the development default");
    }

    let capability = paddy_model_provider::initialize(&config.model)
        .await
        .map_err(|e| {
            tracing::error!("Model initialization failed: {e}");
            e
        })?;

    if let Capability::Unavailable(reason) = &capability {
        tracing::warn!("{BACKEND} not available ({reason}). Running in limited mode.");
    }

    let state = Arc::new(State::new(capability));
    let app = construct_router(
        state,
        RouterConfig {
            max_upload_bytes: config.max_upload_bytes,
        },
    );

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("API listening on {}", addr);

    match config.metrics_port {
        Some(port) => {
            metrics::init_metrics()?;
            let metrics_app = Router::new().route("/metrics", axum::routing::get(metrics::handler));
            let metrics_addr = format!("{}:{}", config.host, port);
            let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr).await?;
            tracing::info!("Metrics listening on {}", metrics_addr);

            tokio::select! {
                res = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()) => res?,
                res = axum::serve(metrics_listener, metrics_app).with_graceful_shutdown(shutdown_signal()) => res?,
            }
        }
        None => {
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?
        }
    }

    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
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
                tracing::error!("Failed to listen for SIGTERM: {e}");
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

    tracing::info!("Shutdown signal received");
}

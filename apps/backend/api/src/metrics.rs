use axum::response::IntoResponse;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the fmt subscriber. `RUST_LOG` overrides the default `info` level.
pub fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();
}

pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("prediction_duration_seconds".to_string()),
            &[0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        )?
        .install_recorder()?;

    PROMETHEUS_HANDLE
        .set(handle)
        .map_err(|_| "metrics already initialized")?;

    metrics::describe_counter!("predictions_total", "Predictions served, by outcome");
    metrics::describe_histogram!(
        "prediction_duration_seconds",
        "Decode plus forward pass duration in seconds"
    );

    tracing::info!("Prometheus metrics initialized");
    Ok(())
}

pub async fn handler() -> impl IntoResponse {
    PROMETHEUS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

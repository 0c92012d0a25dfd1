use std::sync::Arc;

use axum::{Router, extract::DefaultBodyLimit};
use state::State;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod error;
mod routes;
pub mod state;

pub use axum;
pub use paddy_model_provider as model;

/// Default cap on request bodies; large enough for full-resolution phone photos.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct RouterConfig {
    pub max_upload_bytes: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// `POST /api/predict` and `GET /health` over the shared model state.
pub fn construct_router(state: Arc<State>, config: RouterConfig) -> Router {
    Router::new()
        .merge(routes::predict::routes())
        .merge(routes::health::routes())
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

use crate::state::AppState;
use axum::extract::State;
use axum::{Json, Router, routing::get};
use paddy_model_provider::BACKEND;
use serde_json::{Map, Value};

pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

/// `{"status": "healthy"|"limited", "candle_available": bool}`. Always 200.
#[tracing::instrument(name = "GET /health", skip(state))]
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let available = state.backend_available();
    let status = if available { "healthy" } else { "limited" };

    let mut body = Map::new();
    body.insert("status".to_string(), Value::from(status));
    body.insert(format!("{BACKEND}_available"), Value::Bool(available));
    Json(Value::Object(body))
}

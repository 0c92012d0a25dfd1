use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Multipart, State, multipart::MultipartRejection};
use axum::{Json, Router, body::Bytes, routing::post};
use paddy_model_provider::image::{self, RgbImage};
use paddy_model_provider::{BACKEND, Prediction};
use std::time::Instant;

/// Multipart field carrying the upload
pub const IMAGE_FIELD: &str = "image";

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/predict", post(predict))
}

#[tracing::instrument(name = "POST /api/predict", skip(state, multipart))]
pub async fn predict(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Prediction>, ApiError> {
    let classifier = state
        .capability
        .classifier()
        .cloned()
        .ok_or(ApiError::DependencyUnavailable(BACKEND))?;

    // a non-multipart request has no files at all
    let mut multipart = multipart.map_err(|_| ApiError::MissingInput)?;
    let bytes = read_image_field(&mut multipart).await?;
    tracing::debug!(bytes = bytes.len(), "Received upload");

    let started = Instant::now();
    let outcome = tokio::task::spawn_blocking(move || -> Result<Prediction, ApiError> {
        let image = decode_image(&bytes)?;
        Ok(classifier.predict(&image)?)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Inference task failed: {e}")))?;

    record_metrics(&outcome, started.elapsed().as_secs_f64());

    let prediction = outcome?;
    tracing::info!(
        label = %prediction.prediction,
        confidence = prediction.confidence,
        "Prediction served"
    );
    Ok(Json(prediction))
}

/// First file part named `image`. Plain form fields are skipped even when the
/// name matches.
async fn read_image_field(multipart: &mut Multipart) -> Result<Bytes, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(IMAGE_FIELD) && field.file_name().is_some() {
            return Ok(field.bytes().await?);
        }
    }
    Err(ApiError::MissingInput)
}

/// Decode any supported format and force three-channel colour.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, image::ImageError> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

fn record_metrics(outcome: &Result<Prediction, ApiError>, seconds: f64) {
    let label = match outcome {
        Ok(_) => "success",
        Err(ApiError::Decode(_)) => "decode_error",
        Err(_) => "inference_error",
    };
    metrics::counter!("predictions_total", "outcome" => label).increment(1);
    metrics::histogram!("prediction_duration_seconds").record(seconds);
}

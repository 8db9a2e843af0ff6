use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use fluxzip_core::{GenerateRequest, ImageService, ARCHIVE_CONTENT_TYPE, ARCHIVE_FILENAME};
use serde::Serialize;
use tower_http::trace::TraceLayer;

// Application state holding the preloaded model behind the service.
#[derive(Clone)]
pub struct AppState(pub Arc<ImageService>);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/generate-image", post(generate_image_handler))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

#[derive(Debug)]
pub enum ApiError {
    Core(fluxzip_core::Error),
    Task(tokio::task::JoinError),
}

impl From<fluxzip_core::Error> for ApiError {
    fn from(err: fluxzip_core::Error) -> Self {
        Self::Core(err)
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            Self::Core(err) if err.is_client_error() => {
                (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
            }
            Self::Core(err) => {
                tracing::error!(error = %err, "image generation request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            Self::Task(err) => {
                tracing::error!(error = %err, "generation task did not complete");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "generation task did not complete".to_string(),
                )
            }
        };
        (status, Json(ErrorBody { detail })).into_response()
    }
}

async fn generate_image_handler(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Response, ApiError> {
    // Reject bad input before touching the blocking pool.
    req.validate()?;

    tracing::info!(
        num_images = req.num_images,
        seed = req.seed,
        steps = req.num_inference_steps,
        "generating images"
    );
    let service = state.0.clone();
    let archive = tokio::task::spawn_blocking(move || service.generate_archive(&req)).await??;

    let headers = [
        (header::CONTENT_TYPE, ARCHIVE_CONTENT_TYPE.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={ARCHIVE_FILENAME}"),
        ),
    ];
    Ok((headers, archive).into_response())
}

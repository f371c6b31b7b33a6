use std::sync::Arc;

use axum::{
    extract::{Json, State},
    routing::{get, post},
    Router,
};
use reel_core::{GenerationRequest, GenerationResult, RequestOrchestrator};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod error;

use error::ApiError;

pub const GREETING: &str = "Hello, this is the video generation API!";

// Application state holding the orchestrator around the preloaded model.
#[derive(Clone)]
pub struct AppState(Arc<RequestOrchestrator>);

impl AppState {
    pub fn new(orchestrator: RequestOrchestrator) -> Self {
        Self(Arc::new(orchestrator))
    }
}

#[derive(Serialize)]
struct RootResponse {
    message: &'static str,
}

async fn root_handler() -> Json<RootResponse> {
    Json(RootResponse { message: GREETING })
}

async fn generate_video_handler(
    State(state): State<AppState>,
    Json(req): Json<GenerationRequest>,
) -> Result<Json<GenerationResult>, ApiError> {
    info!(payload = ?req, "Received payload");
    let result = state.0.generate_video(req).await?;
    Ok(Json(result))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/generate-video", post(generate_video_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

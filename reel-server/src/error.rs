use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Error returned by the HTTP handlers. Messages are generic; the underlying
/// error has already been logged by the time one of these is built.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: &'static str,
}

impl ApiError {
    pub fn internal(code: &'static str, message: &'static str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code,
            message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "code": self.code,
        }));
        (self.status, body).into_response()
    }
}

impl From<reel_core::Error> for ApiError {
    fn from(err: reel_core::Error) -> Self {
        match err {
            reel_core::Error::Inference(_) => {
                ApiError::internal("INFERENCE_ERROR", "Error during video generation")
            }
            reel_core::Error::Persistence(_) | reel_core::Error::Io(_) => {
                ApiError::internal("PERSISTENCE_ERROR", "Error while saving generated video")
            }
            reel_core::Error::Configuration(_) => {
                ApiError::internal("INTERNAL_ERROR", "An internal error occurred")
            }
        }
    }
}

//! Response bodies shared by the HTTP handlers.

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::emotion::Emotion;
use crate::inference::InferenceError;

/// Error body: `{"error": "<message>"}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

impl IntoResponse for InferenceError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(ErrorResponse::new(self.public_message()))).into_response()
    }
}

/// Body of `GET /health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub feature_dim: usize,
    pub labels: Vec<Emotion>,
    pub timestamp: String,
}

//! Route handlers.

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::types::{ErrorResponse, HealthResponse};
use super::AppState;
use crate::emotion::Emotion;
use crate::inference::{InferenceError, InputError, UploadedFile};

/// Multipart field carrying the audio
const FILE_FIELD: &str = "file";

/// `GET /`: front-end page for signed-in users
pub async fn index(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !state.gate.is_authenticated(&headers) {
        debug!("Unauthenticated request for /, redirecting to {}", state.signin_url);
        return Redirect::to(&state.signin_url).into_response();
    }

    let path = state.static_dir.join("index.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            warn!("Front-end page {:?} unavailable: {}", path, e);
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new("Page not found")),
            )
                .into_response()
        }
    }
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: true,
        feature_dim: state.service.feature_dim(),
        labels: Emotion::ALL.to_vec(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `POST /predict`: classify the uploaded `file`
pub async fn predict(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let upload = match multipart {
        Ok(multipart) => match read_upload(multipart, state.max_upload_bytes).await {
            Ok(upload) => upload,
            Err(e) => {
                warn!("Rejected upload: {}", e);
                return e.into_response();
            }
        },
        Err(rejection) => {
            debug!("Request is not multipart: {}", rejection);
            None
        }
    };

    let service = Arc::clone(&state.service);
    match tokio::task::spawn_blocking(move || service.infer(upload)).await {
        Ok(Ok(verdict)) => (StatusCode::OK, Json(verdict)).into_response(),
        Ok(Err(e)) => e.into_response(),
        Err(e) => {
            error!("Inference task failed: {}", e);
            InferenceError::Internal(anyhow::anyhow!("inference task failed: {}", e))
                .into_response()
        }
    }
}

/// Find the first `file` part that is an actual file upload
async fn read_upload(
    mut multipart: Multipart,
    limit: usize,
) -> Result<Option<UploadedFile>, InferenceError> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Ok(None),
            Err(e) => return Err(multipart_error(e, limit)),
        };

        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        // A plain form value named "file" is not an upload
        let filename = match field.file_name() {
            Some(name) => name.to_string(),
            None => continue,
        };

        let bytes = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
        debug!("Received upload {:?} ({} bytes)", filename, bytes.len());
        return Ok(Some(UploadedFile::new(filename, bytes.to_vec())));
    }
}

fn multipart_error(e: MultipartError, limit: usize) -> InferenceError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        InputError::TooLarge { size: 0, limit }.into()
    } else {
        debug!("Malformed multipart body: {}", e.body_text());
        InputError::NoFile.into()
    }
}

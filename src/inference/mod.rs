//! Request orchestration: validate the upload, persist it, run
//! load → extract → normalize → classify → decide, and always clean up.

pub mod upload;

use axum::http::StatusCode;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::audio::{AudioError, AudioLoader};
use crate::config::Config;
use crate::emotion::{DecisionPolicy, Verdict};
use crate::features::{ExtractionError, FeatureExtractor};
use crate::model::{ModelArtifacts, ModelError};
pub use upload::{sanitize_filename, sweep_stale_uploads, TempUpload, UPLOAD_PREFIX};

/// Message returned for every internal failure; details stay in the log
pub const INTERNAL_ERROR_MESSAGE: &str = "Audio processing failed. Please try again.";

const DECODE_ERROR_MESSAGE: &str = "Could not decode audio file";

const EXTRACTION_ERROR_MESSAGE: &str = "Feature extraction failed - possibly corrupt audio";

/// Problems with the request itself
#[derive(Debug, Error)]
pub enum InputError {
    #[error("No file uploaded")]
    NoFile,

    #[error("No selected file")]
    EmptyFilename,

    #[error("Invalid filename")]
    InvalidFilename,

    #[error("File too large")]
    TooLarge { size: usize, limit: usize },
}

/// Any failure of a single inference request
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}

impl InferenceError {
    fn is_internal(&self) -> bool {
        match self {
            Self::Input(_) | Self::Extraction(_) => false,
            Self::Audio(e) => matches!(e, AudioError::Io(_) | AudioError::Resample(_)),
            Self::Model(_) | Self::Internal(_) => true,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Input(InputError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            _ if self.is_internal() => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Message safe to show the caller
    pub fn public_message(&self) -> String {
        if self.is_internal() {
            return INTERNAL_ERROR_MESSAGE.to_string();
        }
        match self {
            Self::Input(e) => e.to_string(),
            Self::Audio(AudioError::TooShort { min_secs, .. }) => {
                format!("Audio too short (min {} seconds required)", min_secs)
            }
            Self::Audio(_) => DECODE_ERROR_MESSAGE.to_string(),
            Self::Extraction(_) => EXTRACTION_ERROR_MESSAGE.to_string(),
            Self::Model(_) | Self::Internal(_) => INTERNAL_ERROR_MESSAGE.to_string(),
        }
    }

    fn log(&self) {
        if self.is_internal() {
            error!("Inference failed: {}", self);
        } else {
            warn!("Rejected request: {}", self);
        }
    }
}

/// A file received from the client
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }
}

/// The full prediction pipeline with its shared read-only state
pub struct InferenceService {
    loader: AudioLoader,
    extractor: FeatureExtractor,
    artifacts: Arc<ModelArtifacts>,
    policy: DecisionPolicy,
    upload_dir: PathBuf,
    max_upload_bytes: usize,
}

impl InferenceService {
    pub fn new(config: &Config, artifacts: Arc<ModelArtifacts>) -> anyhow::Result<Self> {
        let extractor = FeatureExtractor::new(config.features.clone())?;
        if artifacts.feature_dim() != extractor.feature_dim() {
            anyhow::bail!(
                "Model expects {} features but extractor produces {}",
                artifacts.feature_dim(),
                extractor.feature_dim()
            );
        }

        Ok(Self {
            loader: AudioLoader::from_config(&config.features, &config.policy),
            extractor,
            artifacts,
            policy: DecisionPolicy::from_config(&config.policy),
            upload_dir: config.server.upload_dir.clone(),
            max_upload_bytes: config.server.max_upload_bytes,
        })
    }

    pub fn feature_dim(&self) -> usize {
        self.extractor.feature_dim()
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Run one request. The temporary file, once written, is removed on
    /// every exit path.
    pub fn infer(&self, upload: Option<UploadedFile>) -> Result<Verdict, InferenceError> {
        let request_id = Uuid::new_v4();
        let span = info_span!("infer", request_id = %request_id);
        let _enter = span.enter();

        let result = self.infer_upload(request_id, upload);
        match &result {
            Ok(verdict) => info!(
                emotion = verdict.label(),
                confidence = ?verdict.confidence(),
                "Prediction complete"
            ),
            Err(e) => e.log(),
        }
        result
    }

    fn infer_upload(
        &self,
        request_id: Uuid,
        upload: Option<UploadedFile>,
    ) -> Result<Verdict, InferenceError> {
        let upload = upload.ok_or(InputError::NoFile)?;
        if upload.filename.is_empty() {
            return Err(InputError::EmptyFilename.into());
        }
        let filename = sanitize_filename(&upload.filename).ok_or(InputError::InvalidFilename)?;
        if upload.bytes.len() > self.max_upload_bytes {
            return Err(InputError::TooLarge {
                size: upload.bytes.len(),
                limit: self.max_upload_bytes,
            }
            .into());
        }

        let temp = TempUpload::persist(&self.upload_dir, request_id, &filename, &upload.bytes)
            .map_err(|e| anyhow::Error::new(e).context("Failed to persist upload"))?;

        let result = self.infer_path(temp.path());
        temp.close();
        result
    }

    /// Run the pipeline on a file already on disk
    pub fn infer_path(&self, path: &Path) -> Result<Verdict, InferenceError> {
        let clip = self.loader.load(path)?;
        debug!(
            "Loaded {:.2}s of audio ({} samples)",
            clip.duration_secs(),
            clip.len()
        );

        let features = self.extractor.extract(&clip)?;
        debug!("Extracted {} features", features.len());

        let prediction = self.artifacts.score(&features)?;
        let (top, p) = prediction.top();
        debug!("Top class {} with p={:.4}", top, p);

        Ok(self.policy.decide(&prediction))
    }
}

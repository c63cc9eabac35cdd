use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub schema_version: u32,
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub policy: PolicyConfig,
    pub features: FeatureConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: 1,
            server: ServerConfig::default(),
            model: ModelConfig::default(),
            policy: PolicyConfig::default(),
            features: FeatureConfig::default(),
        }
    }
}

/// HTTP listener, upload handling and the session gate
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Directory for request-scoped temporary uploads
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    /// Directory holding the front-end page served at `/`
    pub static_dir: PathBuf,
    /// Header set by the authenticating reverse proxy
    pub auth_header: String,
    /// Where unauthenticated callers of `/` are sent
    pub signin_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 5000,
            upload_dir: std::env::temp_dir().join("speech-emotion-uploads"),
            max_upload_bytes: 10 * 1024 * 1024,
            static_dir: PathBuf::from("static"),
            auth_header: "x-authenticated-user".to_string(),
            signin_url: "/signin".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.bind_address, self.port))
    }
}

/// Trained artifact locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Classifier weights (`.json` dense network, or `.onnx` with the `onnx` feature)
    pub classifier_path: Option<PathBuf>,
    /// Persisted feature scaler (`mean` / `scale`)
    pub scaler_path: Option<PathBuf>,
    /// Number of threads for ONNX inference
    pub n_threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            classifier_path: None,
            scaler_path: None,
            n_threads: 1,
        }
    }
}

/// Request policy constants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Clips shorter than this are rejected before feature extraction
    pub min_duration_secs: f64,
    /// Top percentage below this yields an "uncertain" verdict
    pub confidence_threshold_percent: f64,
    /// Decoding stops after this much audio
    pub max_decode_secs: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            min_duration_secs: 0.5,
            confidence_threshold_percent: 20.0,
            max_decode_secs: 30.0,
        }
    }
}

/// Feature extraction parameters.
///
/// These must match the parameters the scaler and classifier were trained
/// against; changing any of them invalidates the persisted artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub sample_rate: u32,
    /// Only the first `analysis_secs` of the clip are analysed
    pub analysis_secs: f64,
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_mfcc: usize,
    pub n_chroma: usize,
    pub n_mels: usize,
    pub preemphasis: f32,
    /// Dynamic range kept below the peak when converting power to dB
    pub top_db: f32,
    /// Chroma tuning offset in fractions of a bin; estimated per clip when unset
    pub tuning: Option<f32>,
    /// Length of the vector handed to the scaler and classifier
    pub feature_dim: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            analysis_secs: 3.0,
            n_fft: 2048,
            hop_length: 512,
            n_mfcc: 40,
            n_chroma: 12,
            n_mels: 128,
            preemphasis: 0.97,
            top_db: 80.0,
            tuning: None,
            feature_dim: 63,
        }
    }
}

impl FeatureConfig {
    /// Maximum number of samples analysed
    pub fn analysis_samples(&self) -> usize {
        (self.analysis_secs * self.sample_rate as f64).round() as usize
    }

    /// Length of the concatenated vector before it is fitted to `feature_dim`
    pub fn raw_dim(&self) -> usize {
        self.n_mfcc + self.n_chroma + self.n_mels
    }
}

impl Config {
    /// Get the default config directory
    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home.join(".speech-emotion"))
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Get the default models directory
    pub fn models_dir() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("models"))
    }

    /// Load config from the given file, or return default when it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {:?}", path))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file {:?}", path))
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load config from the default location or return default
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                debug!("Failed to load config, using default: {}", e);
                Self::default()
            }
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")
    }

    /// Get the classifier path, falling back to the models directory
    pub fn classifier_path(&self) -> Result<PathBuf> {
        match self.model.classifier_path {
            Some(ref path) => Ok(path.clone()),
            None => Ok(Self::models_dir()?.join("emotion_classifier.json")),
        }
    }

    /// Get the scaler path, falling back to the models directory
    pub fn scaler_path(&self) -> Result<PathBuf> {
        match self.model.scaler_path {
            Some(ref path) => Ok(path.clone()),
            None => Ok(Self::models_dir()?.join("feature_scaler.json")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.schema_version, 1);
        assert_eq!(config.policy.min_duration_secs, 0.5);
        assert_eq!(config.policy.confidence_threshold_percent, 20.0);
        assert_eq!(config.features.feature_dim, 63);
    }

    #[test]
    fn test_feature_defaults() {
        let features = FeatureConfig::default();
        assert_eq!(features.sample_rate, 22050);
        assert_eq!(features.n_fft, 2048);
        assert_eq!(features.hop_length, 512);
        assert_eq!(features.analysis_samples(), 66150);
        assert_eq!(features.raw_dim(), 180);
    }

    #[test]
    fn test_partial_config_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"server": {"port": 8080}, "policy": {"min_duration_secs": 1.0}}"#)
            .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert_eq!(config.policy.min_duration_secs, 1.0);
        assert_eq!(config.policy.confidence_threshold_percent, 20.0);
    }

    #[test]
    fn test_missing_config_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.model.classifier_path = Some(PathBuf::from("/models/classifier.json"));
        config.save(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(
            loaded.model.classifier_path,
            Some(PathBuf::from("/models/classifier.json"))
        );
    }

    #[test]
    fn test_explicit_model_paths() {
        let mut config = Config::default();
        config.model.scaler_path = Some(PathBuf::from("/tmp/scaler.json"));
        assert_eq!(config.scaler_path().unwrap(), PathBuf::from("/tmp/scaler.json"));
    }

    #[test]
    fn test_socket_addr() {
        let config = ServerConfig::default();
        assert_eq!(config.socket_addr().unwrap().port(), 5000);

        let bad = ServerConfig {
            bind_address: "not an address".to_string(),
            ..Default::default()
        };
        assert!(bad.socket_addr().is_err());
    }
}

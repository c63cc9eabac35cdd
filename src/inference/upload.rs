//! Request-scoped temporary files for uploaded audio.

use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Prefix of every temporary upload; used by the startup sweep
pub const UPLOAD_PREFIX: &str = "ser-upload-";

/// Longest sanitized filename kept in a temporary name
const MAX_FILENAME_LEN: usize = 100;

/// Reduce a client-supplied filename to a safe single path component.
///
/// Path separators and whitespace become `_`, anything outside
/// `[A-Za-z0-9._-]` is dropped, and leading/trailing dots and underscores
/// are stripped. Returns `None` when nothing usable remains.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let spaced: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");

    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    let trimmed = kept.trim_matches(|c| c == '.' || c == '_');

    if trimmed.is_empty() {
        return None;
    }

    // Keep the tail so the extension survives truncation
    let start = trimmed.len().saturating_sub(MAX_FILENAME_LEN);
    Some(trimmed[start..].to_string())
}

/// Uploaded bytes persisted under a unique name; removed on `close` or drop
pub struct TempUpload {
    file: NamedTempFile,
}

impl TempUpload {
    /// Write `bytes` to `<dir>/ser-upload-<request_id>-<random>-<filename>`
    pub fn persist(
        dir: &Path,
        request_id: Uuid,
        filename: &str,
        bytes: &[u8],
    ) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;

        let prefix = format!("{}{}-", UPLOAD_PREFIX, request_id);
        let suffix = format!("-{}", filename);
        let mut file = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(&suffix)
            .tempfile_in(dir)?;

        file.write_all(bytes)?;
        file.flush()?;

        debug!("Upload persisted to {:?} ({} bytes)", file.path(), bytes.len());
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Delete the file now, logging instead of failing if removal errors
    pub fn close(self) {
        let path = self.file.path().to_path_buf();
        match self.file.close() {
            Ok(()) => debug!("Removed temporary upload {:?}", path),
            Err(e) => warn!("Failed to remove temporary upload {:?}: {}", path, e),
        }
    }
}

/// Remove uploads left behind by a previous process
pub fn sweep_stale_uploads(dir: &Path) -> std::io::Result<usize> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        let is_upload = entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with(UPLOAD_PREFIX))
            .unwrap_or(false);
        if !is_upload || !entry.file_type()?.is_file() {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to remove stale upload {:?}: {}", entry.path(), e),
        }
    }

    if removed > 0 {
        info!("Removed {} stale uploads from {:?}", removed, dir);
    }
    Ok(removed)
}

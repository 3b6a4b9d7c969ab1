//! Dual-mode image persistence.
//!
//! `hosted` mode writes generated images under the configured image
//! directory, keyed by an opaque id, and the web layer serves them back from
//! `GET /api/image/{filename}`. `local` mode persists nothing server-side:
//! callers keep the inline base64 payload and the browser stores it.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rand::RngExt;
use rand::distr::Alphanumeric;

use crate::constants::OPAQUE_ID_LENGTH;
use crate::error::ColorpageError;

/// Where generated images end up, chosen once per deployment.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StorageMode {
    /// images are written server-side and served back by file id
    Hosted,
    /// nothing is persisted server-side
    Local,
}

impl FromStr for StorageMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "hosted" => Ok(StorageMode::Hosted),
            "local" => Ok(StorageMode::Local),
            other => Err(format!(
                "Unknown storage mode {:?}, expected \"hosted\" or \"local\"",
                other
            )),
        }
    }
}

/// Reference to an image persisted in hosted mode.
#[derive(Clone, Debug)]
pub struct StoredImage {
    /// opaque id the file is stored under
    pub file_id: String,
    /// stored filename, `{file_id}.{ext}`
    pub filename: String,
    /// retrieval path for the serving endpoint
    pub path: String,
}

/// Generates an opaque alphanumeric id for files and profiles.
pub fn opaque_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(OPAQUE_ID_LENGTH)
        .map(char::from)
        .collect()
}

/// True when a requested filename is a bare name with no traversal parts.
pub fn is_safe_filename(filename: &str) -> bool {
    !filename.is_empty()
        && !filename.contains("..")
        && !filename.contains('/')
        && !filename.contains('\\')
}

/// Content type for a stored filename, by extension. Unknown extensions are
/// served as PNG, matching what the generator produces by default.
pub fn content_type_for(filename: &str) -> &'static str {
    match Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpeg") | Some("jpg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}

/// The storage adapter handed to request handlers.
#[derive(Clone, Debug)]
pub struct ImageStore {
    mode: StorageMode,
    root: PathBuf,
}

impl ImageStore {
    /// Builds a store; `root` is only touched in hosted mode.
    pub fn new(mode: StorageMode, root: PathBuf) -> Self {
        Self { mode, root }
    }

    /// Persists one image. Hosted mode writes `{id}.{extension}` under the
    /// image directory and returns the reference; local mode returns `None`
    /// so the caller keeps the image inline.
    pub async fn store(
        &self,
        bytes: &[u8],
        extension: &str,
    ) -> Result<Option<StoredImage>, ColorpageError> {
        if self.mode == StorageMode::Local {
            return Ok(None);
        }

        tokio::fs::create_dir_all(&self.root).await?;
        let file_id = opaque_id();
        let filename = format!("{}.{}", file_id, extension);
        tokio::fs::write(self.root.join(&filename), bytes).await?;

        Ok(Some(StoredImage {
            path: format!("/api/image/{}", filename),
            file_id,
            filename,
        }))
    }

    /// Reads a stored image back, along with its filesystem metadata for
    /// cache headers. Unsafe names are rejected before any lookup.
    pub async fn read(
        &self,
        filename: &str,
    ) -> Result<(Vec<u8>, std::fs::Metadata), ColorpageError> {
        if !is_safe_filename(filename) {
            return Err(ColorpageError::BadRequest("Invalid filename".to_string()));
        }

        let path = self.root.join(filename);
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Err(ColorpageError::NotFound("Image".to_string())),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(ColorpageError::NotFound("Image".to_string()));
            }
            Err(err) => return Err(ColorpageError::InternalServerError(err.to_string())),
        };

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok((bytes, metadata)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(ColorpageError::NotFound("Image".to_string()))
            }
            Err(err) => Err(ColorpageError::InternalServerError(err.to_string())),
        }
    }
}

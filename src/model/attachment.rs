//! Stored attachment metadata.
//!
//! One record per extracted MIME part. The bytes live on disk under the
//! message's namespace directory; only the location is kept here.

use std::path::PathBuf;

/// Metadata about an extracted email attachment.
///
/// Exactly one of `path` and `error` is set: `path` when the bytes are on
/// disk (freshly written or reused), `error` when storing them failed.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Attachment {
    /// Sanitized filename as stored on disk (never empty).
    pub filename: String,

    /// MIME content type (e.g. `"image/jpeg"`, `"application/pdf"`).
    pub content_type: String,

    /// Decoded size in bytes.
    pub size: u64,

    /// Where the bytes were saved. `None` only when storing failed.
    pub path: Option<PathBuf>,

    /// Why storing failed. Omitted from JSON when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Attachment {
    /// Attachment whose bytes are on disk at `path`.
    pub fn stored(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        size: u64,
        path: PathBuf,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            size,
            path: Some(path),
            error: None,
        }
    }

    /// Attachment that could not be stored.
    pub fn failed(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        size: u64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            size,
            path: None,
            error: Some(error.into()),
        }
    }

    /// Size in KiB, as shown in archive files and listings.
    pub fn size_kb(&self) -> f64 {
        self.size as f64 / 1024.0
    }
}

//! Content-addressed attachment storage.
//!
//! Attachments of one message live under `<root>/<email_hash>/`. Writing is
//! dedup-on-write: a same-named file with identical bytes is reused, a
//! same-named file with different bytes gets a numbered sibling
//! (`name_1.ext`, `name_2.ext`, …). An existing file is never overwritten.
//!
//! There is no lock between the existence check and the write; callers must
//! not ingest the same mailbox from two processes at once.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::ArchiveError;
use crate::model::attachment::Attachment;
use crate::parser::mime::AttachmentPart;

/// Upper bound on numbered siblings tried for one filename.
const MAX_SIBLINGS: u32 = 10_000;

/// Stores attachment bytes beneath a root directory.
#[derive(Debug, Clone)]
pub struct AttachmentStore {
    root: PathBuf,
}

impl AttachmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the attachments of one message.
    pub fn namespace_dir(&self, email_hash: &str) -> PathBuf {
        self.root.join(email_hash)
    }

    /// Store every part of one message, in order.
    ///
    /// Failures are recorded on the returned [`Attachment`]s; nothing here
    /// aborts the remaining parts.
    pub fn store_all(&self, email_hash: &str, parts: &[AttachmentPart]) -> Vec<Attachment> {
        parts.iter().map(|p| self.store(email_hash, p)).collect()
    }

    /// Store one attachment part under the message's namespace.
    pub fn store(&self, email_hash: &str, part: &AttachmentPart) -> Attachment {
        let size = part.data.len() as u64;
        let dir = self.namespace_dir(email_hash);

        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!(dir = %dir.display(), error = %e, "Could not create attachment directory");
            return failed(part, &dir, format!("could not create directory: {e}"));
        }

        let (stem, ext) = split_extension(&part.filename);
        let mut candidate = dir.join(&part.filename);
        let mut counter = 0u32;

        while candidate.exists() {
            if same_content(&candidate, &part.data) {
                debug!(path = %candidate.display(), "Attachment already stored");
                return Attachment::stored(
                    file_name_of(&candidate),
                    &part.content_type,
                    size,
                    candidate,
                );
            }
            counter += 1;
            if counter > MAX_SIBLINGS {
                let path = dir.join(&part.filename);
                return failed(part, &path, "too many files with the same name");
            }
            candidate = dir.join(format!("{stem}_{counter}{ext}"));
        }

        match std::fs::write(&candidate, &part.data) {
            Ok(()) => {
                debug!(path = %candidate.display(), size, "Attachment written");
                Attachment::stored(
                    file_name_of(&candidate),
                    &part.content_type,
                    size,
                    candidate,
                )
            }
            Err(e) => {
                warn!(path = %candidate.display(), error = %e, "Could not save attachment");
                failed(part, &candidate, e)
            }
        }
    }
}

/// Record for a part that could not be stored; the error text names the path.
fn failed(part: &AttachmentPart, path: &Path, reason: impl std::fmt::Display) -> Attachment {
    let error = ArchiveError::AttachmentWrite {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };
    Attachment::failed(
        &part.filename,
        &part.content_type,
        part.data.len() as u64,
        error.to_string(),
    )
}

/// Attachment namespace key: 12 hex chars of SHA-256 over
/// `message_id + from + date`.
pub fn email_hash(message_id: &str, from: &str, date: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(message_id.as_bytes());
    hasher.update(from.as_bytes());
    hasher.update(date.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..12].to_string()
}

/// Whether the file at `path` holds exactly `data`. Unreadable counts as different.
fn same_content(path: &Path, data: &[u8]) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() && meta.len() == data.len() as u64 => {
            std::fs::read(path).map(|existing| existing == data).unwrap_or(false)
        }
        _ => false,
    }
}

/// Split `name.ext` into `("name", ".ext")`. Leading dots do not start an extension.
fn split_extension(filename: &str) -> (&str, &str) {
    match filename.rfind('.') {
        Some(pos) if filename[..pos].chars().any(|c| c != '.') => {
            (&filename[..pos], &filename[pos..])
        }
        _ => (filename, ""),
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

//! Archive files: one plain-text file per message.
//!
//! File names sort chronologically:
//! `YYYYMMDD_HHMMSS_<subject>_<key>.txt`, with `00000000_000000` standing in
//! for dates that cannot be parsed.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{ArchiveError, Result};
use crate::model::message::Message;
use crate::parser::header::parse_date_wall_clock;

/// Extension of archive files. Only files with it are pruning candidates.
pub const ARCHIVE_EXTENSION: &str = "txt";

/// Prefix used when the `Date` header cannot be parsed.
pub const UNKNOWN_DATE_PREFIX: &str = "00000000_000000";

/// Subject component used when nothing survives sanitization.
const EMPTY_SUBJECT: &str = "no_subject";

/// Maximum length of the subject component.
const MAX_SUBJECT_LEN: usize = 50;

/// Width of the line separating headers from body.
const SEPARATOR_WIDTH: usize = 60;

/// Build the archive file name for a message.
pub fn archive_filename(date: &str, subject: &str, key: &str) -> String {
    let prefix = match parse_date_wall_clock(date) {
        Some(dt) => dt.format("%Y%m%d_%H%M%S").to_string(),
        None => {
            if !date.trim().is_empty() {
                warn!(date, key, "Could not parse date");
            }
            UNKNOWN_DATE_PREFIX.to_string()
        }
    };
    format!(
        "{prefix}_{}_{key}.{ARCHIVE_EXTENSION}",
        sanitize_subject(subject)
    )
}

/// Reduce a subject to a filename-safe component.
///
/// Strips one leading `Re:`/`Fwd:`/`Fw:`, keeps ASCII letters, digits,
/// spaces and hyphens, turns whitespace runs into `_`, and caps the length.
pub fn sanitize_subject(subject: &str) -> String {
    let stripped = strip_reply_prefix(subject);
    let kept: String = stripped
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ' || *c == '-')
        .collect();
    let collapsed = kept.split_whitespace().collect::<Vec<_>>().join("_");
    let truncated: String = collapsed.chars().take(MAX_SUBJECT_LEN).collect();
    if truncated.is_empty() {
        EMPTY_SUBJECT.to_string()
    } else {
        truncated
    }
}

/// Remove a single case-insensitive `Re:`, `Fwd:` or `Fw:` prefix.
fn strip_reply_prefix(subject: &str) -> &str {
    for prefix in ["re", "fwd", "fw"] {
        let Some(head) = subject.get(..prefix.len()) else {
            continue;
        };
        if !head.eq_ignore_ascii_case(prefix) {
            continue;
        }
        if let Some(rest) = subject[prefix.len()..].trim_start().strip_prefix(':') {
            return rest.trim_start();
        }
    }
    subject
}

/// Render the archive file content: header block, separator, body.
pub fn render_archive(msg: &Message) -> String {
    let mut out = String::with_capacity(msg.body.len() + 512);

    out.push_str(&format!("Message-ID: {}\n", msg.message_id));
    if !msg.in_reply_to.is_empty() {
        out.push_str(&format!("In-Reply-To: {}\n", msg.in_reply_to));
    }
    if !msg.references.is_empty() {
        out.push_str(&format!("References: {}\n", msg.references));
    }
    out.push_str(&format!("Date: {}\n", msg.date));
    out.push_str(&format!("From: {}\n", msg.from));
    out.push_str(&format!("To: {}\n", msg.to));
    out.push_str(&format!("Subject: {}\n", msg.subject));

    if !msg.attachments.is_empty() {
        out.push_str(&format!("Attachments: {} file(s)\n", msg.attachments.len()));
        for att in &msg.attachments {
            out.push_str(&format!(
                "  - {} ({}, {:.1} KB)\n",
                att.filename,
                att.content_type,
                att.size_kb()
            ));
            if let Some(ref path) = att.path {
                out.push_str(&format!("    Saved: {}\n", path.display()));
            } else if let Some(ref error) = att.error {
                out.push_str(&format!("    Error: {error}\n"));
            }
        }
    }

    out.push_str(&format!("{}\n", "=".repeat(SEPARATOR_WIDTH)));
    out.push('\n');
    out.push_str(msg.body.trim());
    out.push('\n');
    out
}

/// The directory holding archive files.
#[derive(Debug, Clone)]
pub struct ArchiveDir {
    root: PathBuf,
}

impl ArchiveDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Full path of an archive file.
    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }

    /// Write the archive file for `msg`, replacing any leftover partial file.
    pub fn write(&self, filename: &str, msg: &Message) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.root).map_err(|e| ArchiveError::ArchiveWrite {
            path: self.root.clone(),
            source: e,
        })?;
        let path = self.path_for(filename);
        std::fs::write(&path, render_archive(msg)).map_err(|e| ArchiveError::ArchiveWrite {
            path: path.clone(),
            source: e,
        })?;
        debug!(path = %path.display(), "Archive file written");
        Ok(path)
    }

    /// Read an archive file back.
    pub fn read(&self, filename: &str) -> Result<String> {
        let path = self.path_for(filename);
        std::fs::read_to_string(&path).map_err(|e| ArchiveError::io(path, e))
    }

    /// Names of all archive files (regular `*.txt` files), sorted.
    ///
    /// A missing directory is an empty archive.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ArchiveError::io(&self.root, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ArchiveError::io(&self.root, e))?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            let path = entry.path();
            let is_archive = path
                .extension()
                .is_some_and(|ext| ext == ARCHIVE_EXTENSION);
            if is_file && is_archive {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Size of an archive file, if it exists.
    pub fn file_size(&self, filename: &str) -> Option<u64> {
        std::fs::metadata(self.path_for(filename))
            .ok()
            .map(|m| m.len())
    }
}

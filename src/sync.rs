//! Reconciling mailbox sources against the index.
//!
//! A sync pass reads every configured source, assigns each message its
//! identity key, skips keys already in the index, and writes one archive
//! file plus one index entry for each new message. The index is persisted
//! once, after all sources have been scanned. Running a pass twice over an
//! unchanged mailbox adds nothing the second time.

use std::fmt;

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::MailboxConfig;
use crate::error::{ArchiveError, Result};
use crate::fetch::MailboxFetcher;
use crate::index::store::IndexStore;
use crate::model::entry::IndexEntry;
use crate::model::message::Message;
use crate::parser::reader::MailboxReader;
use crate::store::archive::{archive_filename, ArchiveDir};
use crate::store::attachments::AttachmentStore;

/// Progress callback: `(sources done, total sources, source label)`.
pub type SyncProgress<'a> = &'a dyn Fn(usize, usize, &str);

/// Index key of a message: 12 hex chars of SHA-256 over its Message-ID.
pub fn identity_key(message_id: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(message_id.as_bytes()));
    digest[..12].to_string()
}

/// Deterministic stand-in for a missing Message-ID.
///
/// The `generated-` prefix keeps these apart from native IDs.
pub fn synthesize_message_id(from: &str, date: &str, subject: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(from.as_bytes());
    hasher.update(date.as_bytes());
    hasher.update(subject.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("<generated-{}>", &digest[..16])
}

/// A non-fatal problem recorded during a sync pass.
#[derive(Debug)]
pub enum SyncError {
    /// A whole source could not be read; none of its messages were considered.
    Source { name: String, error: ArchiveError },
    /// One message's archive file could not be written; it was not indexed.
    Archive { filename: String, error: ArchiveError },
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source { name, error } => write!(f, "Error reading {name}: {error}"),
            Self::Archive { filename, error } => write!(f, "Error writing {filename}: {error}"),
        }
    }
}

/// Outcome of one sync pass.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Keys added in this pass, in discovery order.
    pub new_keys: Vec<String>,
    /// Index size after the pass.
    pub total_entries: usize,
    pub errors: Vec<SyncError>,
}

impl SyncReport {
    pub fn new_entries(&self) -> usize {
        self.new_keys.len()
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sync complete. {} new email(s) found. {} total in index.",
            self.new_entries(),
            self.total_entries
        )?;
        if !self.errors.is_empty() {
            write!(f, "\n\nErrors ({}):", self.errors.len())?;
            for err in &self.errors {
                write!(f, "\n  - {err}")?;
            }
        }
        Ok(())
    }
}

/// Drives one sync pass over a fixed set of sources.
pub struct SyncEngine {
    sources: Vec<MailboxConfig>,
    fetcher: Box<dyn MailboxFetcher>,
    attachments: AttachmentStore,
    archive: ArchiveDir,
    index: IndexStore,
}

impl SyncEngine {
    pub fn new(
        sources: Vec<MailboxConfig>,
        fetcher: Box<dyn MailboxFetcher>,
        attachments: AttachmentStore,
        archive: ArchiveDir,
        index: IndexStore,
    ) -> Self {
        Self {
            sources,
            fetcher,
            attachments,
            archive,
            index,
        }
    }

    /// Run one pass. Only loading or persisting the index is fatal.
    pub fn run(&self, progress: Option<SyncProgress<'_>>) -> Result<SyncReport> {
        let mut index = self.index.load()?;
        let mut report = SyncReport::default();
        let reader = MailboxReader::new(&self.attachments);
        let total = self.sources.len();

        for (i, source) in self.sources.iter().enumerate() {
            if let Some(cb) = progress {
                cb(i, total, &source.name);
            }

            let messages = match self
                .fetcher
                .fetch(&source.path)
                .and_then(|data| reader.read(&source.path, &data))
            {
                Ok(messages) => messages,
                Err(error) => {
                    warn!(source = %source.name, error = %error, "Skipping mailbox");
                    report.errors.push(SyncError::Source {
                        name: source.name.clone(),
                        error,
                    });
                    continue;
                }
            };

            for mut msg in messages {
                if msg.message_id.is_empty() {
                    msg.message_id = synthesize_message_id(&msg.from, &msg.date, &msg.subject);
                    debug!(message_id = %msg.message_id, "Synthesized Message-ID");
                }
                let key = identity_key(&msg.message_id);
                if index.contains_key(&key) {
                    continue;
                }

                let filename = archive_filename(&msg.date, &msg.subject, &key);
                if let Err(error) = self.archive.write(&filename, &msg) {
                    warn!(file = %filename, error = %error, "Archive write failed");
                    report.errors.push(SyncError::Archive { filename, error });
                    continue;
                }

                index.insert(key.clone(), new_entry(msg, &source.name, filename));
                report.new_keys.push(key);
            }
        }

        if let Some(cb) = progress {
            cb(total, total, "");
        }

        self.index.persist(&index)?;
        report.total_entries = index.len();
        info!(
            new = report.new_entries(),
            total = report.total_entries,
            errors = report.errors.len(),
            "Sync finished"
        );
        Ok(report)
    }

    pub fn sources(&self) -> &[MailboxConfig] {
        &self.sources
    }
}

fn new_entry(msg: Message, mailbox: &str, filename: String) -> IndexEntry {
    IndexEntry {
        message_id: msg.message_id,
        in_reply_to: msg.in_reply_to,
        references: msg.references,
        from: msg.from,
        to: msg.to,
        subject: msg.subject,
        date: msg.date,
        read: false,
        mailbox: mailbox.to_string(),
        filename,
        action_todo: String::new(),
        action_taken: String::new(),
        attachments: msg.attachments,
    }
}

//! Tiered retention for the archive directory.
//!
//! [`RetentionPruner::plan`] classifies every archive file and never
//! mutates anything. [`RetentionPruner::execute`] deletes a plan's prune set
//! and removes the matching index entries with a single index write.

pub mod classify;
pub mod protect;

use std::collections::HashSet;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::config::RetentionConfig;
use crate::error::Result;
use crate::index::store::IndexStore;
use crate::store::archive::ArchiveDir;

pub use classify::{classify, Classification, Tier};
pub use protect::{load_authoritative_contacts, ProtectReason, ProtectionRule, ProtectionRules};

/// How a prune run behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PruneMode {
    /// Report what would be pruned.
    #[default]
    DryRun,
    /// Delete files and update the index.
    Execute,
    /// Counts only, no listings. Never deletes.
    Summary,
}

impl PruneMode {
    pub fn deletes(self) -> bool {
        self == Self::Execute
    }
}

/// What a prune run would do.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PruneReport {
    pub today: NaiveDate,
    pub index_entries: usize,
    pub files_scanned: usize,
    pub classification: Classification,
    /// Size of each prune-set file that exists, in prune order.
    pub prune_sizes: Vec<(String, u64)>,
}

impl PruneReport {
    /// Estimated bytes freed by deleting the prune set.
    pub fn bytes_freed(&self) -> u64 {
        self.prune_sizes.iter().map(|(_, size)| size).sum()
    }
}

/// What an executed prune actually did.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct PruneOutcome {
    pub deleted: Vec<String>,
    /// Prune-set files already gone; their index entries are removed too.
    pub missing: Vec<String>,
    /// Files that could not be deleted, with the error. Their entries stay.
    pub failed: Vec<(String, String)>,
    pub index_removed: usize,
    pub index_remaining: usize,
    /// Total size of the deleted files.
    pub bytes_freed: u64,
}

impl PruneOutcome {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Classifies and prunes one archive directory.
#[derive(Debug, Clone)]
pub struct RetentionPruner {
    archive: ArchiveDir,
    index: IndexStore,
    config: RetentionConfig,
    rules: ProtectionRules,
}

impl RetentionPruner {
    /// Fails if the tier boundaries are inconsistent.
    pub fn new(
        archive: ArchiveDir,
        index: IndexStore,
        config: RetentionConfig,
        rules: ProtectionRules,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            archive,
            index,
            config,
            rules,
        })
    }

    /// Classify every archive file relative to `today`.
    pub fn plan(&self, today: NaiveDate) -> Result<PruneReport> {
        let index = self.index.load()?;
        let files = self.archive.list()?;
        let classification = classify(&index, &files, today, &self.config, &self.rules);

        let prune_sizes = classification
            .prune
            .iter()
            .filter_map(|name| self.archive.file_size(name).map(|size| (name.clone(), size)))
            .collect();

        info!(
            files = files.len(),
            keep = classification.keep.len(),
            protected = classification.protected.len(),
            unknown = classification.unknown.len(),
            prune = classification.prune.len(),
            "Archive classified"
        );

        Ok(PruneReport {
            today,
            index_entries: index.len(),
            files_scanned: files.len(),
            classification,
            prune_sizes,
        })
    }

    /// Delete the plan's prune set, then write the index once.
    ///
    /// A deletion error is recorded and the batch continues; only index
    /// load/persist failures abort.
    pub fn execute(&self, report: &PruneReport) -> Result<PruneOutcome> {
        let mut index = self.index.load()?;
        let mut outcome = PruneOutcome::default();
        let mut removed: HashSet<&str> = HashSet::new();

        for name in &report.classification.prune {
            let path = self.archive.path_for(name);
            let size = self.archive.file_size(name).unwrap_or(0);
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    info!(file = %name, "Deleted");
                    outcome.deleted.push(name.clone());
                    outcome.bytes_freed += size;
                    removed.insert(name);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(file = %name, "Missing, skipped");
                    outcome.missing.push(name.clone());
                    removed.insert(name);
                }
                Err(e) => {
                    warn!(file = %name, error = %e, "Could not delete");
                    outcome.failed.push((name.clone(), e.to_string()));
                }
            }
        }

        let before = index.len();
        index.retain(|_, entry| !removed.contains(entry.filename.as_str()));
        outcome.index_removed = before - index.len();
        outcome.index_remaining = index.len();

        self.index.persist(&index)?;
        info!(
            deleted = outcome.deleted.len(),
            missing = outcome.missing.len(),
            failed = outcome.failed.len(),
            index_removed = outcome.index_removed,
            "Prune executed"
        );
        Ok(outcome)
    }

    /// Plan, and execute as well when `mode` deletes.
    pub fn run(
        &self,
        today: NaiveDate,
        mode: PruneMode,
    ) -> Result<(PruneReport, Option<PruneOutcome>)> {
        let report = self.plan(today)?;
        let outcome = if mode.deletes() && !report.classification.prune.is_empty() {
            Some(self.execute(&report)?)
        } else {
            None
        };
        Ok((report, outcome))
    }
}

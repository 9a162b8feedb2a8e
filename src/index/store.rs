//! Loading and atomically persisting the JSON index.
//!
//! The whole index is read into memory, mutated, and written back in one
//! piece: serialize to a temporary file in the target's directory, flush it,
//! then rename it over the target. A concurrent reader sees either the old
//! index or the new one, never a mix. There is no locking between writers.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{ArchiveError, Result};
use crate::model::entry::Index;

/// Handle on the index file.
#[derive(Debug, Clone)]
pub struct IndexStore {
    path: PathBuf,
}

impl IndexStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the index file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the full index. A missing file is an empty index.
    pub fn load(&self) -> Result<Index> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No index yet, starting empty");
                return Ok(Index::new());
            }
            Err(e) => return Err(ArchiveError::io(&self.path, e)),
        };

        let index: Index =
            serde_json::from_slice(&data).map_err(|e| ArchiveError::IndexParse {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        debug!(path = %self.path.display(), entries = index.len(), "Loaded index");
        Ok(index)
    }

    /// Persist the full index atomically.
    ///
    /// On any failure before the rename the previously committed file is
    /// left untouched and the temporary file is removed.
    pub fn persist(&self, index: &Index) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| self.write_error(e))?;

        // Dropping the NamedTempFile on an early return deletes it.
        let mut tmp = tempfile::Builder::new()
            .prefix(".index")
            .suffix(".tmp")
            .tempfile_in(&dir)
            .map_err(|e| self.write_error(e))?;

        {
            let mut writer = std::io::BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, index).map_err(|e| self.write_error(e))?;
            writer.write_all(b"\n").map_err(|e| self.write_error(e))?;
            writer.flush().map_err(|e| self.write_error(e))?;
        }
        tmp.as_file().sync_all().map_err(|e| self.write_error(e))?;

        tmp.persist(&self.path).map_err(|e| {
            warn!(path = %self.path.display(), error = %e.error, "Index rename failed");
            self.write_error(e.error)
        })?;

        info!(path = %self.path.display(), entries = index.len(), "Index written");
        Ok(())
    }

    fn write_error(&self, e: impl std::fmt::Display) -> ArchiveError {
        ArchiveError::IndexWrite {
            path: self.path.clone(),
            reason: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entry::IndexEntry;

    fn sample_index() -> Index {
        let mut index = Index::new();
        index.insert(
            "0123456789ab".into(),
            IndexEntry {
                message_id: "<m@x>".into(),
                subject: "Hello".into(),
                filename: "20240104_100000_Hello_0123456789ab.txt".into(),
                mailbox: "root".into(),
                ..Default::default()
            },
        );
        index
    }

    #[test]
    fn test_missing_file_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = IndexStore::new(tmp.path().join("index.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_persist_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let store = IndexStore::new(tmp.path().join("index.json"));
        let index = sample_index();

        store.persist(&index).unwrap();
        assert_eq!(store.load().unwrap(), index);

        let text = std::fs::read_to_string(store.path()).unwrap();
        assert!(text.contains("\n  \"0123456789ab\": {"), "2-space indent: {text}");
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let tmp = tempfile::tempdir().unwrap();
        let store = IndexStore::new(tmp.path().join("index.json"));
        store.persist(&sample_index()).unwrap();
        store.persist(&Index::new()).unwrap();

        let names: Vec<String> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["index.json"]);
    }

    #[test]
    fn test_failed_rename_leaves_target_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("index.json");
        // A non-empty directory cannot be replaced by rename.
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("keep"), b"x").unwrap();

        let err = IndexStore::new(&target)
            .persist(&sample_index())
            .unwrap_err();
        assert!(matches!(err, ArchiveError::IndexWrite { .. }));
        assert!(target.join("keep").exists());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_corrupt_index_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("index.json");
        std::fs::write(&target, b"{ not json").unwrap();
        let err = IndexStore::new(&target).load().unwrap_err();
        assert!(matches!(err, ArchiveError::IndexParse { .. }));
    }
}

//! In-place mutations of a single index entry.
//!
//! Each operation loads the index, changes one entry's `read`,
//! `action_todo` or `action_taken` field, and persists through the same
//! atomic write path the sync engine uses.

use tracing::info;

use crate::error::{ArchiveError, Result};
use crate::index::store::IndexStore;
use crate::model::entry::IndexEntry;
use crate::store::archive::ArchiveDir;

/// Width of the separator lines appended by [`read_email`].
const SEPARATOR_WIDTH: usize = 60;

/// Return an archived message's text and mark it read.
///
/// The index is only rewritten when the flag actually changes. Attachment
/// and action details from the index are appended after the file content.
pub fn read_email(store: &IndexStore, archive: &ArchiveDir, key: &str) -> Result<String> {
    let mut index = store.load()?;
    let entry = index
        .get_mut(key)
        .ok_or_else(|| ArchiveError::EntryNotFound(key.to_string()))?;

    let mut content = archive.read(&entry.filename)?;

    if !entry.read {
        entry.read = true;
        let snapshot = entry.clone();
        store.persist(&index)?;
        info!(key, "Marked email as read");
        append_details(&mut content, &snapshot);
    } else {
        append_details(&mut content, entry);
    }

    Ok(content)
}

/// Set the read flag of one entry.
pub fn mark_email(store: &IndexStore, key: &str, read: bool) -> Result<IndexEntry> {
    let mut index = store.load()?;
    let entry = index
        .get_mut(key)
        .ok_or_else(|| ArchiveError::EntryNotFound(key.to_string()))?;
    entry.read = read;
    let updated = entry.clone();
    store.persist(&index)?;
    info!(key, read, "Updated read flag");
    Ok(updated)
}

/// Replace the action fields that are given; leave the others alone.
pub fn update_action(
    store: &IndexStore,
    key: &str,
    action_todo: Option<&str>,
    action_taken: Option<&str>,
) -> Result<IndexEntry> {
    let mut index = store.load()?;
    let entry = index
        .get_mut(key)
        .ok_or_else(|| ArchiveError::EntryNotFound(key.to_string()))?;

    if action_todo.is_none() && action_taken.is_none() {
        return Err(ArchiveError::NothingToUpdate);
    }
    if let Some(todo) = action_todo {
        entry.action_todo = todo.to_string();
    }
    if let Some(taken) = action_taken {
        entry.action_taken = taken.to_string();
    }
    let updated = entry.clone();
    store.persist(&index)?;
    info!(key, "Updated action fields");
    Ok(updated)
}

fn append_details(content: &mut String, entry: &IndexEntry) {
    let separator = "=".repeat(SEPARATOR_WIDTH);

    if !entry.attachments.is_empty() {
        content.push_str(&format!("\n{separator}\n"));
        content.push_str(&format!("Attachments ({}):\n", entry.attachments.len()));
        for att in &entry.attachments {
            content.push_str(&format!(
                "  - {} | {} | {:.1} KB\n",
                att.filename,
                att.content_type,
                att.size_kb()
            ));
            if let Some(ref path) = att.path {
                content.push_str(&format!("    Path: {}\n", path.display()));
            }
            if let Some(ref error) = att.error {
                content.push_str(&format!("    Error: {error}\n"));
            }
        }
    }

    if !entry.action_todo.is_empty() || !entry.action_taken.is_empty() {
        content.push_str(&format!("\n{separator}\n"));
        if !entry.action_todo.is_empty() {
            content.push_str(&format!("Action TODO: {}\n", entry.action_todo));
        }
        if !entry.action_taken.is_empty() {
            content.push_str(&format!("Action Taken: {}\n", entry.action_taken));
        }
    }
}

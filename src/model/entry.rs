//! Index entries: the persisted record of one archived message.

use std::collections::BTreeMap;

use super::attachment::Attachment;

/// The whole index: 12-hex identity key → entry.
///
/// A `BTreeMap` keeps the serialized JSON in a stable key order, which keeps
/// diffs of the index file small.
pub type Index = BTreeMap<String, IndexEntry>;

/// One archived message, as stored in `index.json`.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct IndexEntry {
    pub message_id: String,
    pub in_reply_to: String,
    pub references: String,
    pub from: String,
    pub to: String,
    pub subject: String,
    /// Original `Date` header string.
    pub date: String,
    pub read: bool,
    /// Label of the mailbox source the message was first seen in.
    pub mailbox: String,
    /// Archive file name, relative to the archive directory.
    pub filename: String,
    pub action_todo: String,
    pub action_taken: String,
    /// Attachments as extracted at ingestion time.
    pub attachments: Vec<Attachment>,
}

impl IndexEntry {
    /// Whether at least one attachment was recorded for this message.
    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_default() {
        let entry: IndexEntry =
            serde_json::from_str(r#"{"subject": "Hi", "filename": "x.txt"}"#).unwrap();
        assert_eq!(entry.subject, "Hi");
        assert!(!entry.read);
        assert!(entry.attachments.is_empty());
        assert!(!entry.has_attachments());
    }

    #[test]
    fn test_index_keys_sorted_in_json() {
        let mut index = Index::new();
        index.insert("bbbbbbbbbbbb".into(), IndexEntry::default());
        index.insert("aaaaaaaaaaaa".into(), IndexEntry::default());
        let json = serde_json::to_string(&index).unwrap();
        assert!(json.find("aaaaaaaaaaaa").unwrap() < json.find("bbbbbbbbbbbb").unwrap());
    }
}

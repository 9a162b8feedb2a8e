//! End-to-end tests: sync fixture mailboxes into an archive, then use the
//! index operations on the result.

use std::path::{Path, PathBuf};
use std::time::Duration;

use assert_fs::prelude::*;
use predicates::prelude::*;

use mailvault::config::MailboxConfig;
use mailvault::error::ArchiveError;
use mailvault::fetch::{DirectFetcher, PrivilegedFetcher};
use mailvault::index::reader::{list_entries, stats, unread, ALL_MAILBOXES};
use mailvault::index::store::IndexStore;
use mailvault::index::update::{mark_email, read_email, update_action};
use mailvault::store::archive::ArchiveDir;
use mailvault::store::attachments::AttachmentStore;
use mailvault::sync::{identity_key, synthesize_message_id, SyncEngine, SyncError};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn mailbox(name: &str, file: &str) -> MailboxConfig {
    MailboxConfig {
        name: name.to_string(),
        path: fixture(file),
    }
}

fn engine(root: &Path, sources: Vec<MailboxConfig>) -> SyncEngine {
    SyncEngine::new(
        sources,
        Box::new(PrivilegedFetcher::new(
            vec!["cat".to_string()],
            Duration::from_secs(10),
        )),
        AttachmentStore::new(root.join("attachments")),
        ArchiveDir::new(root.join("emails")),
        IndexStore::new(root.join("emails").join("index.json")),
    )
}

fn all_sources() -> Vec<MailboxConfig> {
    vec![
        mailbox("root", "simple.mbox"),
        mailbox("claude", "attachments.mbox"),
        mailbox("cron", "no_message_id.mbox"),
    ]
}

#[test]
fn test_sync_archives_every_message() {
    let temp = assert_fs::TempDir::new().unwrap();
    let report = engine(temp.path(), all_sources()).run(None).unwrap();

    assert_eq!(report.new_entries(), 8);
    assert_eq!(report.total_entries, 8);
    assert!(report.errors.is_empty());
    assert_eq!(
        report.to_string(),
        "Sync complete. 8 new email(s) found. 8 total in index."
    );

    let emails = temp.child("emails");
    emails
        .child("index.json")
        .assert(predicate::path::is_file());
    let key = identity_key("<msg001@example.com>");
    emails
        .child(format!("20240115_100000_Hello_World_{key}.txt"))
        .assert(predicate::str::starts_with(
            "Message-ID: <msg001@example.com>\n",
        ));

    let reply_key = identity_key("<msg002@example.com>");
    emails
        .child(format!("20240115_113000_Hello_World_{reply_key}.txt"))
        .assert(predicate::str::contains("In-Reply-To: <msg001@example.com>\n"));

    // Sender's local time is kept in the name.
    let jose_key = identity_key("<msg003@example.com>");
    emails
        .child(format!("20240116_091500_Reunin_de_equipo_{jose_key}.txt"))
        .assert(predicate::path::is_file());

    let att_key = identity_key("<att001@example.com>");
    emails
        .child(format!("20240202_090000_Quarterly_report_{att_key}.txt"))
        .assert(predicate::str::contains("Attachments: 3 file(s)\n"));
}

#[test]
fn test_synthesized_identity_and_unknown_date() {
    let temp = assert_fs::TempDir::new().unwrap();
    engine(temp.path(), vec![mailbox("cron", "no_message_id.mbox")])
        .run(None)
        .unwrap();

    let index = IndexStore::new(temp.child("emails/index.json").path())
        .load()
        .unwrap();
    let generated = synthesize_message_id("Cron Daemon <cron@example.com>", "", "(no subject)");
    let key = identity_key(&generated);
    let entry = &index[&key];
    assert_eq!(entry.message_id, generated);
    assert_eq!(entry.filename, format!("00000000_000000_no_subject_{key}.txt"));
    assert!(entry.message_id.starts_with("<generated-"));
}

#[test]
fn test_resync_is_a_no_op() {
    let temp = assert_fs::TempDir::new().unwrap();
    let engine = engine(temp.path(), all_sources());
    engine.run(None).unwrap();

    let index_before = std::fs::read(temp.child("emails/index.json").path()).unwrap();
    let archive_before = ArchiveDir::new(temp.child("emails").path()).list().unwrap();

    let report = engine.run(None).unwrap();
    assert_eq!(report.new_entries(), 0);
    assert_eq!(report.total_entries, 8);
    assert_eq!(
        std::fs::read(temp.child("emails/index.json").path()).unwrap(),
        index_before
    );
    assert_eq!(
        ArchiveDir::new(temp.child("emails").path()).list().unwrap(),
        archive_before
    );
}

#[test]
fn test_missing_source_is_reported_and_skipped() {
    let temp = assert_fs::TempDir::new().unwrap();
    let sources = vec![
        mailbox("gone", "does-not-exist.mbox"),
        mailbox("root", "simple.mbox"),
    ];
    let report = SyncEngine::new(
        sources,
        Box::new(DirectFetcher),
        AttachmentStore::new(temp.child("attachments").path()),
        ArchiveDir::new(temp.child("emails").path()),
        IndexStore::new(temp.child("emails/index.json").path()),
    )
    .run(None)
    .unwrap();

    assert_eq!(report.new_entries(), 5);
    assert!(matches!(
        &report.errors[..],
        [SyncError::Source { error: ArchiveError::MailboxNotFound(_), .. }]
    ));
}

#[test]
fn test_index_operations_after_sync() {
    let temp = assert_fs::TempDir::new().unwrap();
    engine(temp.path(), all_sources()).run(None).unwrap();

    let store = IndexStore::new(temp.child("emails/index.json").path());
    let archive = ArchiveDir::new(temp.child("emails").path());

    let index = store.load().unwrap();
    let s = stats(&index);
    assert_eq!(s.total, 8);
    assert_eq!(s.unread, 8);
    assert_eq!(s.with_attachments, 1);
    assert_eq!(s.per_mailbox["root"], 5);

    let listing = list_entries(&index, "root", false, 2);
    let newest: Vec<&str> = listing.entries.iter().map(|(_, e)| e.subject.as_str()).collect();
    assert_eq!(newest, vec!["Final notes", "Message with From in body"]);
    assert_eq!(listing.matched, 5);
    assert_eq!(list_entries(&index, ALL_MAILBOXES, false, 100).matched, 8);

    let oldest_unread = unread(&index)[0].1.subject.clone();
    assert_eq!(oldest_unread, "Hello World");

    let att_key = identity_key("<att001@example.com>");
    let text = read_email(&store, &archive, &att_key).unwrap();
    assert!(text.contains("Report attached, plus the old version."));
    assert!(text.contains("Attachments (3):"));
    assert!(text.contains("  - report_1.pdf | application/pdf | 0.0 KB"));

    update_action(&store, &att_key, Some("file the report"), None).unwrap();
    mark_email(&store, &identity_key("<msg001@example.com>"), true).unwrap();

    let index = store.load().unwrap();
    assert_eq!(stats(&index).unread, 6);
    assert_eq!(index[&att_key].action_todo, "file the report");
    assert!(unread(&index).iter().all(|(k, _)| *k != att_key));
}

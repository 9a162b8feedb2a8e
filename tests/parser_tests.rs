//! Integration tests for the mbox splitter, header decoding, and mailbox reader.

use std::path::Path;

use mailvault::parser::header::{decode_encoded_words, parse_date};
use mailvault::parser::mbox::MboxParser;
use mailvault::parser::reader::{MailboxReader, NO_SUBJECT};
use mailvault::store::attachments::AttachmentStore;

fn fixture(name: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn read_fixture(name: &str, store: &AttachmentStore) -> Vec<mailvault::model::message::Message> {
    let path = fixture(name);
    let data = std::fs::read(&path).unwrap();
    MailboxReader::new(store).read(&path, &data).unwrap()
}

// ─── Test 1: Parse simple.mbox → exactly 5 messages ─────────────────

#[test]
fn test_parse_simple_mbox_count() {
    let parser = MboxParser::new(fixture("simple.mbox"));
    let mut count: u64 = 0;
    parser
        .parse_file(&mut |_offset, _bytes| {
            count += 1;
            true
        })
        .unwrap();
    assert_eq!(count, 5, "simple.mbox should contain exactly 5 messages");
}

// ─── Test 2: First message fields ───────────────────────────────────

#[test]
fn test_parse_simple_mbox_first_message() {
    let tmp = tempfile::tempdir().unwrap();
    let messages = read_fixture("simple.mbox", &AttachmentStore::new(tmp.path()));
    let first = &messages[0];
    assert_eq!(first.subject, "Hello World");
    assert_eq!(first.from, "User One <user1@example.com>");
    assert_eq!(first.message_id, "<msg001@example.com>");
    assert_eq!(first.date, "Mon, 15 Jan 2024 10:00:00 +0000");
    assert_eq!(first.body.trim(), "This is the first message.");
    assert_eq!(first.email_hash.len(), 12);
}

// ─── Test 3: Encoded words in From and Subject ──────────────────────

#[test]
fn test_parse_encoded_words() {
    let tmp = tempfile::tempdir().unwrap();
    let messages = read_fixture("simple.mbox", &AttachmentStore::new(tmp.path()));
    let third = &messages[2];
    assert_eq!(third.from, "José García <jose@example.com>");
    assert_eq!(third.subject, "Reunión de equipo");
}

// ─── Test 4: >From in body is not a separator ───────────────────────

#[test]
fn test_from_escaping_in_body() {
    let tmp = tempfile::tempdir().unwrap();
    let messages = read_fixture("simple.mbox", &AttachmentStore::new(tmp.path()));
    assert_eq!(messages.len(), 5);

    let fourth = &messages[3];
    assert_eq!(fourth.subject, "Message with From in body");
    assert!(
        fourth.body.contains(">From the archives"),
        "Body should keep the escaped line, got: '{}'",
        fourth.body
    );
}

// ─── Test 5: Empty mbox → 0 messages, no error ─────────────────────

#[test]
fn test_parse_empty_mbox() {
    let tmp = tempfile::tempdir().unwrap();
    let messages = read_fixture("empty.mbox", &AttachmentStore::new(tmp.path()));
    assert!(messages.is_empty());
}

// ─── Test 6: Threading headers ──────────────────────────────────────

#[test]
fn test_threading_headers() {
    let tmp = tempfile::tempdir().unwrap();
    let messages = read_fixture("simple.mbox", &AttachmentStore::new(tmp.path()));
    let second = &messages[1];
    assert_eq!(second.subject, "Re: Hello World");
    assert_eq!(second.in_reply_to, "<msg001@example.com>");
    assert_eq!(second.references, "<msg001@example.com>");
}

// ─── Test 7: Nested multipart with colliding attachment names ───────

#[test]
fn test_attachments_extracted_and_deduplicated() {
    let tmp = tempfile::tempdir().unwrap();
    let store = AttachmentStore::new(tmp.path());
    let messages = read_fixture("attachments.mbox", &store);
    assert_eq!(messages.len(), 1);

    let msg = &messages[0];
    assert_eq!(msg.body.trim(), "Report attached, plus the old version.");

    let names: Vec<&str> = msg.attachments.iter().map(|a| a.filename.as_str()).collect();
    assert_eq!(names, vec!["report.pdf", "report_1.pdf", "attachment.png"]);
    for att in &msg.attachments {
        let path = att.path.as_ref().expect("stored");
        assert!(path.starts_with(store.namespace_dir(&msg.email_hash)));
        assert!(att.error.is_none());
    }
    assert_eq!(
        std::fs::read(msg.attachments[0].path.as_ref().unwrap()).unwrap(),
        b"%PDF-1.4\n"
    );
    assert_eq!(
        std::fs::read(msg.attachments[1].path.as_ref().unwrap()).unwrap(),
        b"%PDF-1.3\n"
    );

    // Reading the same mailbox again writes nothing new.
    let again = read_fixture("attachments.mbox", &store);
    assert_eq!(again[0].attachments, msg.attachments);
    let stored = std::fs::read_dir(store.namespace_dir(&msg.email_hash))
        .unwrap()
        .count();
    assert_eq!(stored, 3);
}

// ─── Test 8: Missing headers ────────────────────────────────────────

#[test]
fn test_missing_message_id_and_subject() {
    let tmp = tempfile::tempdir().unwrap();
    let messages = read_fixture("no_message_id.mbox", &AttachmentStore::new(tmp.path()));
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| m.message_id.is_empty()));
    assert_eq!(messages[0].subject, "Nightly backup");
    assert_eq!(messages[1].subject, NO_SUBJECT);
    assert_eq!(messages[1].date, "");
}

// ─── Test 9: Missing mailbox file ───────────────────────────────────

#[test]
fn test_missing_mailbox_file() {
    let err = MboxParser::new(fixture("does-not-exist.mbox"))
        .parse_file(&mut |_, _| true)
        .unwrap_err();
    assert!(err.is_mailbox_unreadable());
}

// ─── Date parsing ───────────────────────────────────────────────────

#[test]
fn test_date_parsing_formats() {
    let d1 = parse_date("Mon, 15 Jan 2024 10:00:00 +0000");
    assert!(d1.is_some(), "Failed to parse RFC 2822 date");

    let d2 = parse_date("15 Jan 2024 10:00:00 +0000");
    assert!(d2.is_some(), "Failed to parse date without day-of-week");

    let d3 = parse_date("Mon, 15 Jan 2024 10:00:00 EST");
    assert!(d3.is_some(), "Failed to parse date with named timezone");

    let d4 = parse_date("2024-01-15T10:00:00Z");
    assert!(d4.is_some(), "Failed to parse ISO 8601 date");
}

// ─── Encoded-word decoding ──────────────────────────────────────────

#[test]
fn test_decode_encoded_words_base64_utf8() {
    assert_eq!(
        decode_encoded_words("=?UTF-8?B?SG9sYSBtdW5kbw==?="),
        "Hola mundo"
    );
}

#[test]
fn test_decode_encoded_words_q_iso8859() {
    assert_eq!(decode_encoded_words("=?ISO-8859-1?Q?caf=E9?="), "café");
}

#[test]
fn test_decode_encoded_words_plain_passthrough() {
    assert_eq!(decode_encoded_words("Normal subject"), "Normal subject");
}

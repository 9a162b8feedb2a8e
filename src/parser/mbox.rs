//! Streaming MBOX splitter.
//!
//! Splits an envelope-delimited stream into raw RFC 5322 messages. Works on
//! any [`BufRead`], so the same code handles a file on disk and the bytes
//! returned by a privileged reader. Tolerant of malformed input.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{ArchiveError, Result};

/// Size of the internal read buffer when reading from a file.
const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Default maximum message size in bytes (256 MB).
const MAX_MESSAGE_SIZE: usize = 256 * 1024 * 1024;

/// Streaming MBOX splitter.
///
/// Invokes a caller-supplied callback for every message boundary it finds.
/// The parser is tolerant of:
///
/// - Mixed `\n` and `\r\n` line endings
/// - `From ` lines not preceded by a blank line (logs a warning)
/// - Truncated messages at EOF
/// - NUL bytes and other binary content in the body
/// - UTF-8 BOM at the start of the stream
pub struct MboxParser {
    source: PathBuf,
    max_message_size: usize,
}

impl MboxParser {
    /// Create a parser. `source` is only used for error and log context.
    pub fn new(source: impl AsRef<Path>) -> Self {
        Self {
            source: source.as_ref().to_path_buf(),
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }

    /// Override the per-message size cap. Longer messages are skipped whole.
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    /// Split the file at `source`.
    pub fn parse_file(&self, message_callback: &mut dyn FnMut(u64, &[u8]) -> bool) -> Result<u64> {
        let file = File::open(&self.source).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ArchiveError::MailboxNotFound(self.source.clone())
            } else {
                ArchiveError::io(&self.source, e)
            }
        })?;
        self.parse(
            BufReader::with_capacity(READ_BUFFER_SIZE, file),
            message_callback,
        )
    }

    /// Split an in-memory mailbox.
    pub fn parse_bytes(
        &self,
        data: &[u8],
        message_callback: &mut dyn FnMut(u64, &[u8]) -> bool,
    ) -> Result<u64> {
        self.parse(data, message_callback)
    }

    /// Split every message from `reader`, calling `message_callback` for each.
    ///
    /// The callback receives `(offset, raw_bytes)` where `raw_bytes` starts
    /// with the `From ` envelope line, and returns `true` to continue or
    /// `false` to stop early.
    ///
    /// Returns the number of messages delivered.
    pub fn parse<R: BufRead>(
        &self,
        mut reader: R,
        message_callback: &mut dyn FnMut(u64, &[u8]) -> bool,
    ) -> Result<u64> {
        let mut count: u64 = 0;
        let mut current_offset: u64 = 0;
        let mut message_buf: Vec<u8> = Vec::with_capacity(64 * 1024);
        let mut message_start: u64 = 0;
        let mut prev_line_was_empty = true;
        let mut first_line = true;
        let mut oversized = false;

        // Reusable line buffer
        let mut line_buf: Vec<u8> = Vec::with_capacity(4096);

        loop {
            line_buf.clear();
            let read = reader
                .read_until(b'\n', &mut line_buf)
                .map_err(|e| ArchiveError::io(&self.source, e))?;
            if read == 0 {
                break; // EOF
            }
            let line_len = read as u64;

            let is_from_line = is_mbox_separator(&line_buf);

            if is_from_line {
                if !first_line && !prev_line_was_empty {
                    warn!(
                        source = %self.source.display(),
                        offset = current_offset,
                        "Found 'From ' separator without preceding blank line"
                    );
                }
                if !message_buf.is_empty() {
                    if oversized {
                        self.warn_oversized(message_start);
                    } else {
                        if !message_callback(message_start, &message_buf) {
                            return Ok(count);
                        }
                        count += 1;
                    }
                }
                message_start = current_offset;
                message_buf.clear();
                message_buf.extend_from_slice(&line_buf);
                oversized = message_buf.len() > self.max_message_size;
            } else if message_buf.len() + line_buf.len() <= self.max_message_size {
                message_buf.extend_from_slice(&line_buf);
            } else {
                oversized = true;
            }

            prev_line_was_empty = is_blank_line(&line_buf);
            first_line = false;
            current_offset += line_len;
        }

        // Flush last message
        if !message_buf.is_empty() {
            if oversized {
                self.warn_oversized(message_start);
            } else if message_callback(message_start, &message_buf) {
                count += 1;
            }
        }

        Ok(count)
    }

    fn warn_oversized(&self, offset: u64) {
        warn!(
            source = %self.source.display(),
            offset,
            max_size = self.max_message_size,
            "Message exceeds maximum size, skipping"
        );
    }
}

/// Split `data` into owned raw messages.
pub fn split_messages(source: &Path, data: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut messages = Vec::new();
    MboxParser::new(source).parse_bytes(data, &mut |_offset, raw| {
        messages.push(raw.to_vec());
        true
    })?;
    Ok(messages)
}

/// Check whether a line is an MBOX separator (`From ` at the start).
fn is_mbox_separator(line: &[u8]) -> bool {
    // Skip BOM if present at very start
    let line = line.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(line);
    line.starts_with(b"From ")
}

/// Check whether a line is blank (empty or only whitespace / CR / LF).
fn is_blank_line(line: &[u8]) -> bool {
    line.iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b' ' || b == b'\t')
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_MESSAGES: &[u8] = b"From a@example.com Thu Jan 01 00:00:00 2024\n\
Subject: One\n\
\n\
Body one\n\
>From the escaped line\n\
\n\
From b@example.com Thu Jan 01 00:00:01 2024\n\
Subject: Two\n\
\n\
Body two\n";

    #[test]
    fn test_is_mbox_separator() {
        assert!(is_mbox_separator(
            b"From user@example.com Thu Jan 01 00:00:00 2024\n"
        ));
        assert!(!is_mbox_separator(b"from user@example.com\n")); // lowercase
        assert!(!is_mbox_separator(b">From user@example.com\n")); // escaped
        assert!(!is_mbox_separator(b"Subject: From here\n"));
    }

    #[test]
    fn test_is_blank_line() {
        assert!(is_blank_line(b"\n"));
        assert!(is_blank_line(b"\r\n"));
        assert!(is_blank_line(b"  \n"));
        assert!(!is_blank_line(b"hello\n"));
    }

    #[test]
    fn test_is_mbox_separator_with_bom() {
        let mut line = vec![0xEF, 0xBB, 0xBF];
        line.extend_from_slice(b"From user@example.com Thu Jan 01 00:00:00 2024\n");
        assert!(is_mbox_separator(&line));
    }

    #[test]
    fn test_split_two_messages() {
        let messages = split_messages(Path::new("mem"), TWO_MESSAGES).unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].starts_with(b"From a@example.com"));
        assert!(String::from_utf8_lossy(&messages[0]).contains(">From the escaped line"));
        assert!(messages[1].starts_with(b"From b@example.com"));
    }

    #[test]
    fn test_empty_input() {
        let messages = split_messages(Path::new("mem"), b"").unwrap();
        assert!(messages.is_empty());
    }

    #[test]
    fn test_early_stop() {
        let mut seen = 0;
        let count = MboxParser::new("mem")
            .parse_bytes(TWO_MESSAGES, &mut |_, _| {
                seen += 1;
                false
            })
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(seen, 1);
    }

    #[test]
    fn test_oversized_message_is_skipped() {
        let mut seen = Vec::new();
        let count = MboxParser::new("mem")
            .with_max_message_size(80)
            .parse_bytes(TWO_MESSAGES, &mut |_, raw| {
                seen.push(raw.to_vec());
                true
            })
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(seen.len(), 1);
        assert!(seen[0].starts_with(b"From b@example.com"));
        assert!(seen[0].ends_with(b"Body two\n"));
    }

    #[test]
    fn test_oversized_last_message_is_skipped() {
        let count = MboxParser::new("mem")
            .with_max_message_size(60)
            .parse_bytes(TWO_MESSAGES, &mut |_, _| true)
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_missing_file() {
        let err = MboxParser::new("/nonexistent/mailbox")
            .parse_file(&mut |_, _| true)
            .unwrap_err();
        assert!(matches!(err, ArchiveError::MailboxNotFound(_)));
    }
}

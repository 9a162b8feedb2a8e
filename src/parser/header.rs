//! Header block handling: unfolding, RFC 2047 encoded-words, and `Date`
//! parsing.
//!
//! Only a handful of fields matter to the archive, so the header block is
//! unfolded into `(name, value)` pairs and looked up by name. Dates go
//! through a normalizing pass (weekday, trailing comment, IMAP dashes,
//! zone abbreviations) before a small table of formats is tried.

use base64::Engine;
use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use tracing::debug;

/// The header fields the archive cares about, unfolded and trimmed.
///
/// `from`, `to` and `subject` have encoded-words resolved; `date`,
/// `message_id`, `in_reply_to` and `references` are kept verbatim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageHeaders {
    pub message_id: String,
    pub from: String,
    pub to: String,
    /// `None` when the message has no `Subject` header at all.
    pub subject: Option<String>,
    pub date: String,
    pub in_reply_to: String,
    pub references: String,
}

/// Extract [`MessageHeaders`] from the raw header block of one message.
pub fn parse_message_headers(raw_headers: &[u8]) -> MessageHeaders {
    let fields = HeaderFields::parse(&header_text(raw_headers));
    let verbatim = |name: &str| fields.get(name).unwrap_or_default().to_string();
    let decoded = |name: &str| decode_encoded_words(fields.get(name).unwrap_or_default());

    MessageHeaders {
        message_id: verbatim("message-id"),
        from: decoded("from"),
        to: decoded("to"),
        subject: fields.get("subject").map(decode_encoded_words),
        date: verbatim("date"),
        in_reply_to: verbatim("in-reply-to"),
        references: verbatim("references"),
    }
}

/// Split a raw message at the first blank line (LF or CRLF).
///
/// The header half keeps its final line ending. A message without a blank
/// line is all header.
pub fn split_header_body(data: &[u8]) -> (&[u8], &[u8]) {
    let lf = find(data, b"\n\n").map(|at| (at, at + 1, at + 2));
    let crlf = find(data, b"\r\n\r\n").map(|at| (at, at + 2, at + 4));
    let first = match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    };
    match first {
        Some((_, head_end, body_start)) => (&data[..head_end], &data[body_start..]),
        None => (data, &[]),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Header bytes as text: UTF-8 when valid, Windows-1252 otherwise.
fn header_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
    }
}

/// Unfolded header fields in message order, names lowercased.
#[derive(Debug, Default)]
struct HeaderFields(Vec<(String, String)>);

impl HeaderFields {
    fn parse(text: &str) -> Self {
        let mut fields: Vec<(String, String)> = Vec::new();
        for line in text.lines() {
            if line.starts_with([' ', '\t']) {
                if let Some((_, value)) = fields.last_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
            } else if let Some((name, value)) = line.split_once(':') {
                fields.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
            }
        }
        Self(fields)
    }

    /// First value of `name` (lowercase).
    fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Resolve RFC 2047 encoded-words in a header value.
///
/// Whitespace between two adjacent encoded-words is dropped. Anything that
/// does not decode is kept as written.
pub fn decode_encoded_words(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    let mut after_word = false;

    while let Some(start) = rest.find("=?") {
        let (gap, candidate) = rest.split_at(start);
        match decode_word(candidate) {
            Some((text, consumed)) => {
                if !(after_word && gap.trim().is_empty()) {
                    out.push_str(gap);
                }
                out.push_str(&text);
                rest = &candidate[consumed..];
                after_word = true;
            }
            None => {
                out.push_str(gap);
                out.push_str("=?");
                rest = &candidate[2..];
                after_word = false;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Decode the `=?charset?B|Q?payload?=` at the start of `s`.
///
/// Returns the text and the number of bytes of `s` it spans.
fn decode_word(s: &str) -> Option<(String, usize)> {
    let inner = s.strip_prefix("=?")?;
    let (charset, inner) = inner.split_once('?')?;
    let (encoding, inner) = inner.split_once('?')?;
    let end = inner.find("?=")?;
    let payload = &inner[..end];
    if charset.is_empty() || charset.contains(char::is_whitespace) {
        return None;
    }

    let bytes = match encoding {
        "B" | "b" => decode_b(payload)?,
        "Q" | "q" => decode_q(payload),
        _ => return None,
    };
    let consumed = 2 + charset.len() + 1 + encoding.len() + 1 + end + 2;
    Some((decode_charset(charset, &bytes), consumed))
}

fn decode_b(payload: &str) -> Option<Vec<u8>> {
    let compact: String = payload
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .collect();
    base64::engine::general_purpose::STANDARD_NO_PAD
        .decode(compact)
        .ok()
}

/// Q encoding: `_` is a space, `=XX` a hex byte.
fn decode_q(payload: &str) -> Vec<u8> {
    let bytes = payload.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => out.push(b' '),
            b'=' => match bytes.get(i + 1..i + 3).and_then(hex_byte) {
                Some(byte) => {
                    out.push(byte);
                    i += 3;
                    continue;
                }
                None => out.push(b'='),
            },
            other => out.push(other),
        }
        i += 1;
    }
    out
}

pub(crate) fn hex_byte(pair: &[u8]) -> Option<u8> {
    let digit = |b: u8| (b as char).to_digit(16);
    Some((digit(pair[0])? * 16 + digit(pair[1])?) as u8)
}

/// Decode `bytes` in the named charset; RFC 2231 language suffixes are ignored.
fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    let label = charset.split('*').next().unwrap_or(charset);
    match encoding_rs::Encoding::for_label(label.as_bytes()) {
        Some(encoding) => encoding.decode_without_bom_handling(bytes).0.into_owned(),
        None => {
            debug!(charset = label, "Unknown charset, decoding as UTF-8");
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

// ── Dates ───────────────────────────────────────────────────────

/// Formats tried after normalization, with a numeric offset.
const OFFSET_FORMATS: &[&str] = &[
    "%d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M %z",
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%dT%H:%M:%S%z",
];

/// Formats without a zone; read as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%d %b %Y %H:%M:%S",
    "%b %d %H:%M:%S %Y",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

const WEEKDAYS: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

const ZONES: &[(&str, &str)] = &[
    ("UT", "+0000"),
    ("UTC", "+0000"),
    ("GMT", "+0000"),
    ("EST", "-0500"),
    ("EDT", "-0400"),
    ("CST", "-0600"),
    ("CDT", "-0500"),
    ("MST", "-0700"),
    ("MDT", "-0600"),
    ("PST", "-0800"),
    ("PDT", "-0700"),
    ("CET", "+0100"),
    ("CEST", "+0200"),
    ("JST", "+0900"),
];

/// Parse a `Date` header into a UTC instant.
///
/// Accepts RFC 2822, RFC 3339, IMAP `DD-MON-YYYY`, ctime-style and a few
/// numeric layouts. Returns `None` only when nothing matches; callers that
/// ingest mail report that, queries just sort the entry last.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    parse_with_offset(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| parse_naive(raw).map(|ndt| ndt.and_utc()))
        .or_else(|| mail_parser_date(raw).map(|dt| dt.with_timezone(&Utc)))
}

/// Parse a `Date` header into the sender's wall-clock time.
///
/// `Thu, 04 Jan 2024 23:30:00 -0500` gives `2024-01-04 23:30:00`. Dates
/// without a zone are taken as written.
pub fn parse_date_wall_clock(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    parse_with_offset(raw)
        .map(|dt| dt.naive_local())
        .or_else(|| parse_naive(raw))
        .or_else(|| mail_parser_date(raw).map(|dt| dt.naive_local()))
}

fn parse_with_offset(raw: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt);
    }
    let normalized = normalize_date(raw);
    OFFSET_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(&normalized, fmt).ok())
}

fn parse_naive(raw: &str) -> Option<NaiveDateTime> {
    let normalized = normalize_date(raw);
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&normalized, fmt).ok())
}

/// Last resort: let mail-parser read a synthetic `Date:` header.
fn mail_parser_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let message = format!("Date: {raw}\n\n");
    let parsed = mail_parser::MessageParser::default().parse(message.as_bytes())?;
    DateTime::parse_from_rfc3339(&parsed.date()?.to_rfc3339()).ok()
}

/// Rewrite common real-world variants into something the format tables read.
///
/// Drops a trailing `(comment)` and a leading weekday, expands
/// `16-JUL-2025` to `16 Jul 2025`, and replaces a trailing zone
/// abbreviation with its offset.
fn normalize_date(raw: &str) -> String {
    let without_comment = raw.split('(').next().unwrap_or(raw).trim();
    let mut tokens: Vec<String> = strip_weekday(without_comment)
        .split_whitespace()
        .map(String::from)
        .collect();

    if let Some(mut expanded) = tokens.first().and_then(|t| expand_dashed_date(t)) {
        expanded.extend(tokens.drain(1..));
        tokens = expanded;
    }
    if tokens.len() > 1 {
        if let Some(last) = tokens.last_mut() {
            if let Some((_, offset)) = ZONES.iter().find(|(name, _)| last.eq_ignore_ascii_case(name)) {
                *last = offset.to_string();
            }
        }
    }
    tokens.join(" ")
}

fn strip_weekday(s: &str) -> &str {
    let Some(first) = s.split(|c: char| c == ',' || c.is_whitespace()).next() else {
        return s;
    };
    let is_weekday = WEEKDAYS
        .iter()
        .any(|day| first.get(..3).is_some_and(|p| p.eq_ignore_ascii_case(day)))
        && first.chars().all(|c| c.is_ascii_alphabetic());
    if !is_weekday {
        return s;
    }
    s[first.len()..].trim_start_matches([',', ' ', '\t'])
}

/// `16-JUL-2025` → `["16", "Jul", "2025"]`.
fn expand_dashed_date(token: &str) -> Option<Vec<String>> {
    let mut parts = token.split('-');
    let (day, month, year) = (parts.next()?, parts.next()?, parts.next()?);
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if parts.next().is_some()
        || !all_digits(day)
        || day.len() > 2
        || month.len() != 3
        || !month.chars().all(|c| c.is_ascii_alphabetic())
        || year.len() != 4
        || !all_digits(year)
    {
        return None;
    }
    let month = format!("{}{}", month[..1].to_ascii_uppercase(), month[1..].to_ascii_lowercase());
    Some(vec![day.to_string(), month, year.to_string()])
}

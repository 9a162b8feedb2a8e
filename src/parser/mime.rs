//! MIME message parsing: plain-text body selection and attachment detection.

use base64::Engine;
use mail_parser::{MessageParser, MessagePart, MimeHeaders, PartType};

use crate::parser::header::{self, MessageHeaders};

/// Content type assumed for parts without a `Content-Type` header.
const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// Filename used when sanitization leaves nothing behind.
const FALLBACK_FILENAME: &str = "attachment";

/// Extension used when a MIME type has no registered extension.
const FALLBACK_EXTENSION: &str = ".bin";

/// One message decoded from raw bytes, before attachments are stored.
#[derive(Debug, Clone, Default)]
pub struct ParsedMessage {
    pub headers: MessageHeaders,
    /// Plain-text body, decoded permissively.
    pub body: String,
    /// Attachment parts in MIME walk order.
    pub attachments: Vec<AttachmentPart>,
}

/// Decoded bytes of a part that qualifies as an attachment.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentPart {
    /// Sanitized, non-empty filename.
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Parse a complete raw message (optionally starting with its `From ` line).
///
/// Never fails: text is decoded permissively and a message `mail-parser`
/// cannot make sense of still yields its headers and raw body.
pub fn parse_message(raw_message: &[u8]) -> ParsedMessage {
    let message_bytes = skip_from_line(raw_message);
    let (header_bytes, body_bytes) = header::split_header_body(message_bytes);
    let headers = header::parse_message_headers(header_bytes);

    match MessageParser::default().parse(message_bytes) {
        Some(msg) => {
            let multipart = is_multipart(&msg);
            let body = if multipart {
                select_body(&msg.parts).unwrap_or_default()
            } else {
                msg.parts
                    .first()
                    .map(|p| String::from_utf8_lossy(p.contents()).into_owned())
                    .unwrap_or_default()
            };
            let attachments = if multipart {
                collect_attachments(message_bytes, &msg.parts)
            } else {
                Vec::new()
            };
            ParsedMessage {
                headers,
                body,
                attachments,
            }
        }
        None => ParsedMessage {
            headers,
            body: String::from_utf8_lossy(body_bytes).into_owned(),
            attachments: Vec::new(),
        },
    }
}

fn is_multipart(msg: &mail_parser::Message<'_>) -> bool {
    matches!(
        msg.parts.first().map(|p| &p.body),
        Some(PartType::Multipart(_))
    )
}

/// Pick the plain-text body from a multipart message.
///
/// First choice: a `text/plain` part that is not a named attachment.
/// Second choice: any `text/*` part without an attachment disposition.
fn select_body(parts: &[MessagePart<'_>]) -> Option<String> {
    let leaves = || parts.iter().filter(|p| !is_container(p));

    let plain = leaves().find(|p| {
        let named_attachment = matches!(disposition(p).as_deref(), Some("attachment" | "inline"))
            && p.attachment_name().is_some();
        content_type(p) == "text/plain" && !named_attachment && !p.contents().is_empty()
    });
    if let Some(part) = plain {
        return Some(String::from_utf8_lossy(part.contents()).into_owned());
    }

    leaves()
        .find(|p| {
            content_type(p).starts_with("text/")
                && disposition(p).as_deref() != Some("attachment")
                && !p.contents().is_empty()
        })
        .map(|part| String::from_utf8_lossy(part.contents()).into_owned())
}

/// Collect every part that has a filename or an explicit attachment disposition.
///
/// Bare `text/plain` and `text/html` parts without a filename are body
/// candidates, never attachments. `raw` is the buffer the parts were parsed
/// from.
fn collect_attachments(raw: &[u8], parts: &[MessagePart<'_>]) -> Vec<AttachmentPart> {
    let mut result = Vec::new();

    for part in parts.iter().filter(|p| !is_container(p)) {
        let name = part.attachment_name();
        let is_attachment_disposition = disposition(part).as_deref() == Some("attachment");
        if name.is_none() && !is_attachment_disposition {
            continue;
        }

        let ctype = content_type(part);
        if name.is_none() && (ctype == "text/plain" || ctype == "text/html") {
            continue;
        }

        let filename = match name {
            Some(raw) => sanitize_filename(raw),
            None => format!("{FALLBACK_FILENAME}{}", preferred_extension(&ctype)),
        };

        result.push(AttachmentPart {
            filename,
            content_type: ctype,
            data: attachment_bytes(raw, part),
        });
    }

    result
}

/// Attachment payload with only the transfer encoding undone.
///
/// `mail-parser` transcodes `text/*` parts to UTF-8 by their charset, so
/// those are decoded again from the raw part to keep the sender's bytes.
fn attachment_bytes(raw: &[u8], part: &MessagePart<'_>) -> Vec<u8> {
    if !matches!(part.body, PartType::Text(_) | PartType::Html(_)) {
        return part.contents().to_vec();
    }
    let Some(encoded) = raw.get(part.raw_body_offset()..part.raw_end_offset()) else {
        return part.contents().to_vec();
    };
    let transfer_encoding = part
        .content_transfer_encoding()
        .map(|e| e.trim().to_ascii_lowercase());
    match transfer_encoding.as_deref() {
        Some("base64") => decode_base64(encoded).unwrap_or_else(|| encoded.to_vec()),
        Some("quoted-printable") => decode_quoted_printable(encoded),
        _ => encoded.to_vec(),
    }
}

/// Base64 body, ignoring line breaks and padding.
fn decode_base64(encoded: &[u8]) -> Option<Vec<u8>> {
    let compact: Vec<u8> = encoded
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace() && *b != b'=')
        .collect();
    base64::engine::general_purpose::STANDARD_NO_PAD
        .decode(compact)
        .ok()
}

/// Quoted-printable body: `=XX` is a byte, `=` before a line break joins lines.
fn decode_quoted_printable(encoded: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded.len());
    let mut i = 0;
    while i < encoded.len() {
        if encoded[i] == b'=' {
            let rest = &encoded[i + 1..];
            if rest.starts_with(b"\r\n") {
                i += 3;
                continue;
            }
            if rest.starts_with(b"\n") {
                i += 2;
                continue;
            }
            if let Some(byte) = rest.get(..2).and_then(header::hex_byte) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(encoded[i]);
        i += 1;
    }
    out
}

/// Multipart containers carry no payload of their own.
fn is_container(part: &MessagePart<'_>) -> bool {
    matches!(part.body, PartType::Multipart(_))
}

/// Lowercase `type/subtype` of a part.
fn content_type(part: &MessagePart<'_>) -> String {
    part.content_type()
        .map(|ct| match ct.subtype() {
            Some(sub) => format!("{}/{}", ct.ctype(), sub),
            None => ct.ctype().to_string(),
        })
        .map(|s| s.to_lowercase())
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string())
}

/// Lowercase `Content-Disposition` value, if any.
fn disposition(part: &MessagePart<'_>) -> Option<String> {
    part.content_disposition()
        .map(|d| d.ctype().trim().to_lowercase())
}

/// Sanitize an attachment filename for use on disk.
///
/// Resolves RFC 2047 encoded-words, drops any directory component, keeps
/// only alphanumerics, `.`, `_`, `-` and space, and trims the result.
pub fn sanitize_filename(raw: &str) -> String {
    let decoded = header::decode_encoded_words(raw);
    let base = decoded.rsplit(['/', '\\']).next().unwrap_or("");
    let kept: String = base
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-' | ' '))
        .collect();
    let trimmed = kept.trim();
    if trimmed.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Registered extension (with leading dot) for a MIME type, `.bin` if unknown.
pub fn preferred_extension(content_type: &str) -> String {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    // mime_guess lists extensions alphabetically; pin the usual ones.
    let preferred = match essence.as_str() {
        "application/pdf" => Some("pdf"),
        "application/zip" => Some("zip"),
        "application/json" => Some("json"),
        "application/octet-stream" => Some("bin"),
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "text/plain" => Some("txt"),
        "text/html" => Some("html"),
        "text/csv" => Some("csv"),
        "text/calendar" => Some("ics"),
        "message/rfc822" => Some("eml"),
        _ => None,
    };

    preferred
        .or_else(|| {
            mime_guess::get_mime_extensions_str(&essence).and_then(|exts| exts.first().copied())
        })
        .map(|ext| format!(".{ext}"))
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
}

/// Skip the `From ` separator line at the start of MBOX messages.
fn skip_from_line(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);

    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}

//! Turning one mailbox source into [`Message`] records.
//!
//! Splitting and MIME decoding happen here; attachment bytes go straight to
//! the [`AttachmentStore`] so each returned message already carries the
//! stored paths (or per-attachment errors).

use std::path::Path;

use tracing::{debug, info};

use crate::error::Result;
use crate::model::message::Message;
use crate::parser::mbox::split_messages;
use crate::parser::mime::parse_message;
use crate::store::attachments::{email_hash, AttachmentStore};

/// Subject recorded for messages without a `Subject` header.
pub const NO_SUBJECT: &str = "(no subject)";

/// Reads mailbox contents into messages, extracting attachments on the way.
#[derive(Debug, Clone)]
pub struct MailboxReader<'a> {
    attachments: &'a AttachmentStore,
}

impl<'a> MailboxReader<'a> {
    pub fn new(attachments: &'a AttachmentStore) -> Self {
        Self { attachments }
    }

    /// Parse the raw bytes of the mailbox at `source`.
    ///
    /// `source` is used for error reporting only; the bytes come from a
    /// [`MailboxFetcher`](crate::fetch::MailboxFetcher). Either every
    /// message is returned or the whole source fails.
    pub fn read(&self, source: &Path, data: &[u8]) -> Result<Vec<Message>> {
        let raw_messages = split_messages(source, data)?;
        let messages: Vec<Message> = raw_messages
            .iter()
            .map(|raw| self.read_message(raw))
            .collect();
        info!(
            source = %source.display(),
            messages = messages.len(),
            "Mailbox read"
        );
        Ok(messages)
    }

    /// Decode one raw message and store its attachments.
    pub fn read_message(&self, raw: &[u8]) -> Message {
        let parsed = parse_message(raw);
        let headers = parsed.headers;

        let message_id = headers.message_id.trim().to_string();
        let hash = email_hash(&message_id, &headers.from, &headers.date);
        let attachments = self.attachments.store_all(&hash, &parsed.attachments);
        if !attachments.is_empty() {
            debug!(
                email_hash = %hash,
                count = attachments.len(),
                "Attachments extracted"
            );
        }

        Message {
            message_id,
            from: headers.from,
            to: headers.to,
            subject: headers.subject.unwrap_or_else(|| NO_SUBJECT.to_string()),
            date: headers.date,
            body: parsed.body,
            in_reply_to: headers.in_reply_to.trim().to_string(),
            references: headers.references.trim().to_string(),
            attachments,
            email_hash: hash,
        }
    }
}

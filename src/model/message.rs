//! A message as produced by one mailbox scan.

use super::attachment::Attachment;

/// Structured view of one RFC 5322 message read from a mailbox.
///
/// Not persisted itself: the sync engine turns it into an archive file and
/// an [`IndexEntry`](super::entry::IndexEntry).
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    /// Trimmed `Message-ID` header. Empty when the source had none.
    pub message_id: String,

    /// Decoded `From` header.
    pub from: String,

    /// Decoded `To` header.
    pub to: String,

    /// Decoded subject, `"(no subject)"` when the header is missing.
    pub subject: String,

    /// Original `Date` header string, kept verbatim.
    pub date: String,

    /// Plain-text body.
    pub body: String,

    /// Trimmed `In-Reply-To` header.
    pub in_reply_to: String,

    /// Trimmed `References` header.
    pub references: String,

    /// Extracted attachments in MIME walk order.
    pub attachments: Vec<Attachment>,

    /// Attachment namespace key (12 hex chars).
    pub email_hash: String,
}

//! Protection rules: files the pruner must never thin out.
//!
//! Rules are checked in registration order; the first one that matches
//! names the reason reported for the file.

use std::fmt;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::model::entry::IndexEntry;

/// Why a file was excluded from thinning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectReason {
    HasAttachments,
    AuthoritativeContact,
}

impl fmt::Display for ProtectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HasAttachments => f.write_str("has attachments"),
            Self::AuthoritativeContact => f.write_str("authoritative contact"),
        }
    }
}

/// One named protection predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtectionRule {
    /// The entry recorded at least one attachment.
    Attachments,
    /// `from` or `to` contains one of these lowercase addresses.
    AuthoritativeContact(Vec<String>),
}

impl ProtectionRule {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Attachments => "attachments",
            Self::AuthoritativeContact(_) => "authoritative-contact",
        }
    }

    /// The reason this rule protects `entry`, if it does.
    pub fn check(&self, entry: &IndexEntry) -> Option<ProtectReason> {
        match self {
            Self::Attachments => entry
                .has_attachments()
                .then_some(ProtectReason::HasAttachments),
            Self::AuthoritativeContact(contacts) => {
                let combined = format!("{} {}", entry.from, entry.to).to_lowercase();
                contacts
                    .iter()
                    .any(|c| combined.contains(c.as_str()))
                    .then_some(ProtectReason::AuthoritativeContact)
            }
        }
    }
}

/// Ordered set of protection rules.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProtectionRules {
    rules: Vec<ProtectionRule>,
}

impl ProtectionRules {
    pub fn new(rules: Vec<ProtectionRule>) -> Self {
        Self { rules }
    }

    /// Attachment protection, plus contact protection when a list is available.
    pub fn standard(contacts: Option<Vec<String>>) -> Self {
        let mut rules = vec![ProtectionRule::Attachments];
        if let Some(contacts) = contacts {
            rules.push(ProtectionRule::AuthoritativeContact(contacts));
        }
        Self::new(rules)
    }

    pub fn rules(&self) -> &[ProtectionRule] {
        &self.rules
    }

    /// First matching reason. Files without an index entry are never protected.
    pub fn protects(&self, entry: Option<&IndexEntry>) -> Option<ProtectReason> {
        let entry = entry?;
        self.rules.iter().find_map(|rule| rule.check(entry))
    }
}

#[derive(Deserialize)]
struct ContactsFile {
    #[serde(default)]
    authoritative: Vec<ContactItem>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ContactItem {
    Object { email: String },
    Plain(String),
    Other(serde_json::Value),
}

/// Load the authoritative-contact list.
///
/// Accepts `{"authoritative": [{"email": "..."}, "...", ...]}`. Returns
/// `None`, with a warning, when the file is missing, unreadable, malformed
/// or lists no addresses; the contact rule is then disabled.
pub fn load_authoritative_contacts(path: Option<&Path>) -> Option<Vec<String>> {
    let contacts = path.and_then(|p| match read_contacts(p) {
        Ok(contacts) => Some(contacts),
        Err(reason) => {
            debug!(path = %p.display(), reason = %reason, "Contact list not loaded");
            None
        }
    });

    match contacts {
        Some(contacts) if !contacts.is_empty() => Some(contacts),
        _ => {
            warn!("Authoritative contact list not found or unreadable; contact-based protection is disabled");
            None
        }
    }
}

fn read_contacts(path: &Path) -> Result<Vec<String>, String> {
    let data = std::fs::read(path).map_err(|e| e.to_string())?;
    let file: ContactsFile = serde_json::from_slice(&data).map_err(|e| e.to_string())?;

    let mut contacts: Vec<String> = file
        .authoritative
        .into_iter()
        .filter_map(|item| match item {
            ContactItem::Object { email } | ContactItem::Plain(email) => Some(email),
            ContactItem::Other(_) => None,
        })
        .map(|email| email.trim().to_lowercase())
        .filter(|email| !email.is_empty())
        .collect();
    contacts.sort();
    contacts.dedup();
    Ok(contacts)
}

//! Core data model types: parsed messages, stored attachments, and index entries.

pub mod attachment;
pub mod entry;
pub mod message;

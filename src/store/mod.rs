//! On-disk storage: per-message archive files and content-addressed attachments.

pub mod archive;
pub mod attachments;

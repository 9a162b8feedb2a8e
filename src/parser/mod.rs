//! Email parsing: mbox splitting, header decoding, MIME handling, and the
//! mailbox reader that ties them together.

pub mod header;
pub mod mbox;
pub mod mime;
pub mod reader;

//! The JSON index: persistence, per-entry updates and queries.

pub mod reader;
pub mod store;
pub mod update;

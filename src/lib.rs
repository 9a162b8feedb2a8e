//! `mailvault`: a mailbox archiver with tiered retention.
//!
//! Mailbox sources are split into one text file per message plus a
//! content-addressed attachment store, tracked by a single JSON index that
//! is always replaced atomically. A pruner thins old archive files by age
//! tier while never touching protected ones.

pub mod config;
pub mod error;
pub mod fetch;
pub mod index;
pub mod model;
pub mod parser;
pub mod retention;
pub mod store;
pub mod sync;

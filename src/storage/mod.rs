//! Persistent storage: SQLite document store with versioning and audit

pub mod database;

pub use database::{DocumentDb, DocumentWrite, StoreStats};

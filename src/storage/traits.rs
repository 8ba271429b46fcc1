//! Storage traits and error types
//!
//! This module defines the trait interface for frontier persistence
//! backends and associated error types.

use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Unsupported progress format version {found} (expected {expected})")]
    UnsupportedFormat { found: String, expected: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable home of the frontier: packed URL words plus a free-form
/// string property map
///
/// The frontier keeps its own in-memory copy and hands only changed rows to
/// `save`, so implementations never see a full rewrite.
pub trait FrontierStore {
    /// Returns true if the store did not exist before it was opened
    fn is_new(&self) -> bool;

    /// Loads every persisted URL with its packed status word
    fn load_urls(&self) -> StorageResult<HashMap<String, u16>>;

    /// Loads the property map
    fn load_properties(&self) -> StorageResult<HashMap<String, String>>;

    /// Upserts URL words and properties atomically
    ///
    /// # Arguments
    ///
    /// * `urls` - Changed URLs with their new packed words
    /// * `properties` - Changed properties
    fn save(&mut self, urls: &[(String, u16)], properties: &[(String, String)])
        -> StorageResult<()>;

    /// Counts persisted URLs
    fn count_urls(&self) -> StorageResult<u64>;
}

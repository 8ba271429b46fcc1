//! Storage module for persisting crawl progress
//!
//! This module handles:
//! - The SQLite progress database holding the frontier between runs
//! - Schema and format-version management
//! - The exclusive lock over a destination directory

mod lock;
mod schema;
mod sqlite;
mod traits;

pub use lock::{DirectoryLock, LOCK_FILE_NAME};
pub use schema::FORMAT_VERSION;
pub use sqlite::SqliteFrontierStore;
pub use traits::{FrontierStore, StorageError, StorageResult};

use std::path::Path;

/// Name of the progress database inside a destination directory
pub const PROGRESS_FILE_NAME: &str = "progress.db";

/// Opens or creates the progress database of a destination directory
///
/// # Arguments
///
/// * `directory` - The destination directory
///
/// # Returns
///
/// * `Ok(SqliteFrontierStore)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to initialize storage
pub fn open_progress_store(directory: &Path) -> StorageResult<SqliteFrontierStore> {
    SqliteFrontierStore::new(&directory.join(PROGRESS_FILE_NAME))
}

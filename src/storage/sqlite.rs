//! SQLite implementation of the frontier store

use crate::storage::schema::{initialize_schema, FORMAT_VERSION};
use crate::storage::traits::{FrontierStore, StorageError, StorageResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;

/// SQLite-backed frontier store (`progress.db`)
pub struct SqliteFrontierStore {
    conn: Connection,
    is_new: bool,
}

impl SqliteFrontierStore {
    /// Opens or creates a progress database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteFrontierStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open it, or it was written by an
    ///   incompatible format version
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA mmap_size = 268435456;
        ",
        )?;

        Self::with_connection(conn)
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        initialize_schema(&conn)?;

        let version: Option<String> = conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'format-version'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let is_new = match version {
            None => {
                conn.execute(
                    "INSERT INTO meta (key, value) VALUES ('format-version', ?1)",
                    params![FORMAT_VERSION.to_string()],
                )?;
                true
            }
            Some(found) if found == FORMAT_VERSION.to_string() => false,
            Some(found) => {
                return Err(StorageError::UnsupportedFormat {
                    found,
                    expected: FORMAT_VERSION,
                })
            }
        };

        Ok(Self { conn, is_new })
    }
}

impl FrontierStore for SqliteFrontierStore {
    fn is_new(&self) -> bool {
        self.is_new
    }

    fn load_urls(&self) -> StorageResult<HashMap<String, u16>> {
        let mut stmt = self.conn.prepare("SELECT url, word FROM urls")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u16>(1)?))
        })?;

        let mut urls = HashMap::new();
        for row in rows {
            let (url, word) = row?;
            urls.insert(url, word);
        }
        Ok(urls)
    }

    fn load_properties(&self) -> StorageResult<HashMap<String, String>> {
        let mut stmt = self.conn.prepare("SELECT key, value FROM properties")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut properties = HashMap::new();
        for row in rows {
            let (key, value) = row?;
            properties.insert(key, value);
        }
        Ok(properties)
    }

    fn save(
        &mut self,
        urls: &[(String, u16)],
        properties: &[(String, String)],
    ) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO urls (url, word) VALUES (?1, ?2)
                 ON CONFLICT(url) DO UPDATE SET word = excluded.word",
            )?;
            for (url, word) in urls {
                stmt.execute(params![url, word])?;
            }

            let mut stmt = tx.prepare_cached(
                "INSERT INTO properties (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )?;
            for (key, value) in properties {
                stmt.execute(params![key, value])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn count_urls(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM urls", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

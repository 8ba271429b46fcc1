//! Database schema of the progress store

/// Version written to `meta` when a store is created
pub const FORMAT_VERSION: u32 = 1;

/// SQL schema for the progress database
pub const SCHEMA_SQL: &str = r#"
-- Packed crawl state per URL
CREATE TABLE IF NOT EXISTS urls (
    url TEXT PRIMARY KEY NOT NULL,
    word INTEGER NOT NULL
) WITHOUT ROWID;

-- Free-form resumption state
CREATE TABLE IF NOT EXISTS properties (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);

-- Store metadata (format-version)
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        assert!(initialize_schema(&conn).is_ok());
    }

    #[test]
    fn test_tables_exist_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        for table in ["urls", "properties", "meta"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "Table {} should exist", table);
        }
    }
}

//! Database schema definitions
//!
//! This module contains the SQL schema of the catalog cache database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Latest catalog per node
CREATE TABLE IF NOT EXISTS catalog_entries (
    node_id TEXT PRIMARY KEY,
    payload TEXT NOT NULL,
    last_updated INTEGER NOT NULL,   -- microseconds since the Unix epoch, UTC
    expired INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_catalog_entries_expired ON catalog_entries(expired);

-- Schema bookkeeping
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
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
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('version', ?1)",
        [get_schema_version().to_string()],
    )?;
    Ok(())
}

/// Gets the current schema version
pub fn get_schema_version() -> u32 {
    1
}

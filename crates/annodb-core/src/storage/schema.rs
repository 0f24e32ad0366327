//! SQLite schema for the document/label/annotation store

use rusqlite::{Connection, Result};

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Stamped into `PRAGMA application_id` so foreign SQLite files are recognized
///
/// First four bytes of md5("annodb") read as a big-endian signed integer.
pub const APPLICATION_ID: i32 = -254_814_926;

/// Initialize the database schema
///
/// Tables, the version row and the application id are written in one
/// transaction.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!(
        r#"
        BEGIN;

        PRAGMA application_id = {APPLICATION_ID};

        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- Documents, identified by the checksum of their content
        CREATE TABLE IF NOT EXISTS document (
            id INTEGER PRIMARY KEY,
            content TEXT NOT NULL,
            content_checksum TEXT UNIQUE NOT NULL,
            display_title TEXT DEFAULT NULL,
            list_title TEXT DEFAULT NULL,
            metadata TEXT DEFAULT NULL,
            CHECK (content != ''),
            CHECK (length(content_checksum) = 32)
        );

        -- Labels; NULL shortcut keys do not collide with each other
        CREATE TABLE IF NOT EXISTS label (
            id INTEGER PRIMARY KEY,
            name TEXT UNIQUE NOT NULL,
            shortcut_key TEXT UNIQUE DEFAULT NULL,
            color TEXT DEFAULT NULL,
            CHECK (name != '')
        );

        -- Annotations (span of a document tagged with a label)
        CREATE TABLE IF NOT EXISTS annotation (
            id INTEGER PRIMARY KEY,
            document_id INTEGER NOT NULL,
            label_id INTEGER NOT NULL,
            start_char INTEGER NOT NULL,
            end_char INTEGER NOT NULL,
            extra_data TEXT DEFAULT NULL,
            UNIQUE (document_id, label_id, start_char, end_char),
            CHECK (0 <= start_char),
            CHECK (start_char < end_char),
            FOREIGN KEY (document_id) REFERENCES document(id) ON DELETE CASCADE,
            FOREIGN KEY (label_id) REFERENCES label(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_annotation_document_id ON annotation(document_id);
        CREATE INDEX IF NOT EXISTS idx_annotation_label_id ON annotation(label_id);

        -- Documents carrying at least one annotation
        CREATE VIEW IF NOT EXISTS labelled_document AS
            SELECT * FROM document
            WHERE id IN (SELECT DISTINCT document_id FROM annotation);

        INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', '{SCHEMA_VERSION}');

        COMMIT;
        "#
    ))
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<Option<i32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_info WHERE key = 'version'")?;
    let result: Result<String> = stmt.query_row([], |row| row.get(0));

    match result {
        Ok(version_str) => Ok(version_str.parse().ok()),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// SQLite's own schema cookie; 0 means nothing was ever created in this file
pub fn sqlite_schema_cookie(conn: &Connection) -> Result<i64> {
    conn.query_row("PRAGMA schema_version", [], |row| row.get(0))
}

pub fn application_id(conn: &Connection) -> Result<i32> {
    conn.query_row("PRAGMA application_id", [], |row| row.get(0))
}

/// Check if the database is empty and needs the schema created
pub fn needs_init(conn: &Connection) -> Result<bool> {
    Ok(sqlite_schema_cookie(conn)? == 0)
}

/// Check that an existing database was created by annodb with a supported schema
pub fn is_compatible(conn: &Connection) -> Result<bool> {
    if application_id(conn)? != APPLICATION_ID {
        return Ok(false);
    }
    let table_exists = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_info'")?
        .exists([])?;
    if !table_exists {
        return Ok(false);
    }
    Ok(matches!(get_schema_version(conn)?, Some(v) if v == SCHEMA_VERSION))
}

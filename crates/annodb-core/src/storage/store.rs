//! SQLite store
//!
//! One `Store` is opened per invocation and owns the only connection. Write
//! helpers are free functions over `&Connection` so the merge engine can run
//! them inside a `Transaction` (which derefs to a connection); the methods on
//! `Store` are conveniences that run them directly.
//!
//! ## Tables
//!
//! - `document` - texts, unique by `content_checksum`
//! - `label` - unique names, optional unique shortcut keys
//! - `annotation` - labelled spans, cascading on document/label deletion

use std::fmt;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde_json::{Map, Value};
use tracing::debug;

use crate::char_indices::CharIndices;
use crate::error::{Error, Result};
use crate::models::{Annotation, Document, Label, NewDocument, Put};
use crate::storage::schema::{init_schema, is_compatible, needs_init};

/// Where the store lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    /// Private in-memory database, discarded when the process ends
    Memory,
    /// Durable SQLite file
    File(PathBuf),
}

impl StoreTarget {
    /// Value meaning "do not persist"
    pub const MEMORY_SENTINEL: &'static str = ":memory:";

    pub fn parse(value: &str) -> Self {
        if value == Self::MEMORY_SENTINEL {
            StoreTarget::Memory
        } else {
            StoreTarget::File(PathBuf::from(value))
        }
    }
}

impl fmt::Display for StoreTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreTarget::Memory => write!(f, "{}", Self::MEMORY_SENTINEL),
            StoreTarget::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Outcome of [`put_label`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelPut {
    pub put: Put,
    /// A shortcut key was requested for a new label but another label owns it
    pub shortcut_dropped: bool,
}

/// An annotation together with its label's name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedAnnotation {
    pub annotation: Annotation,
    pub label_name: String,
}

/// Handle on the document/label/annotation database
pub struct Store {
    conn: Connection,
    target: StoreTarget,
}

impl Store {
    /// Open or create the store
    ///
    /// A new file gets the schema; an existing file must be an annodb
    /// database with a supported schema version.
    pub fn open(target: &StoreTarget) -> Result<Self> {
        let conn = match target {
            StoreTarget::Memory => Connection::open_in_memory()?,
            StoreTarget::File(path) => open_file(path)?,
        };

        let not_a_store = || Error::NotAStore {
            path: PathBuf::from(target.to_string()),
        };
        let fresh = needs_init(&conn).map_err(|_| not_a_store())?;
        if fresh {
            debug!("Creating schema in {}", target);
            init_schema(&conn)?;
        } else if !is_compatible(&conn).map_err(|_| not_a_store())? {
            return Err(not_a_store());
        }
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        debug!("Opened store {}", target);
        Ok(Self {
            conn,
            target: target.clone(),
        })
    }

    /// Open an in-memory store (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::open(&StoreTarget::Memory)
    }

    pub fn target(&self) -> &StoreTarget {
        &self.target
    }

    /// Get a reference to the underlying connection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Start an atomic unit; dropping it without `commit` rolls back
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }

    // ==================== Writes ====================

    pub fn put_document(&self, doc: &NewDocument) -> Result<Put> {
        put_document(&self.conn, doc)
    }

    pub fn put_label(
        &self,
        name: &str,
        shortcut_key: Option<&str>,
        color: Option<&str>,
    ) -> Result<LabelPut> {
        put_label(&self.conn, name, shortcut_key, color)
    }

    pub fn put_annotation(
        &self,
        document_id: i64,
        label_id: i64,
        start_char: usize,
        end_char: usize,
        extra_data: Option<&str>,
    ) -> Result<Put> {
        put_annotation(
            &self.conn,
            document_id,
            label_id,
            start_char,
            end_char,
            extra_data,
        )
    }

    /// Repack the database file; no logical change
    pub fn vacuum(&self) -> Result<()> {
        self.conn.execute_batch("VACUUM;")?;
        Ok(())
    }

    // ==================== Queries ====================

    /// All documents in creation order
    pub fn list_documents(&self) -> Result<Vec<Document>> {
        query_documents(&self.conn, "SELECT * FROM document ORDER BY id")
    }

    /// Documents with at least one annotation, in creation order
    pub fn list_labelled_documents(&self) -> Result<Vec<Document>> {
        query_documents(&self.conn, "SELECT * FROM labelled_document ORDER BY id")
    }

    pub fn get_document(&self, id: i64) -> Result<Option<Document>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM document WHERE id = ?",
            DOCUMENT_COLUMNS
        ))?;
        let row = stmt.query_row(params![id], DocumentRow::from_row).optional()?;
        row.map(DocumentRow::into_document).transpose()
    }

    pub fn find_document_by_checksum(&self, checksum: &str) -> Result<Option<i64>> {
        find_document_by_checksum(&self.conn, checksum)
    }

    /// All labels in creation order
    pub fn list_labels(&self) -> Result<Vec<Label>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, shortcut_key, color FROM label ORDER BY id")?;
        let labels = stmt
            .query_map([], |row| {
                Ok(Label {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    shortcut_key: row.get(2)?,
                    color: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(labels)
    }

    pub fn find_label(&self, name: &str) -> Result<Option<i64>> {
        find_label(&self.conn, name)
    }

    /// Annotations of one document in creation order, with label names
    pub fn list_annotations(&self, document_id: i64) -> Result<Vec<NamedAnnotation>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT a.id, a.document_id, a.label_id, a.start_char, a.end_char, a.extra_data, l.name
            FROM annotation a
            JOIN label l ON a.label_id = l.id
            WHERE a.document_id = ?
            ORDER BY a.id
            "#,
        )?;

        let annotations = stmt
            .query_map(params![document_id], |row| {
                let start: i64 = row.get(3)?;
                let end: i64 = row.get(4)?;
                Ok(NamedAnnotation {
                    annotation: Annotation {
                        id: row.get(0)?,
                        document_id: row.get(1)?,
                        label_id: row.get(2)?,
                        start_char: start as usize,
                        end_char: end as usize,
                        extra_data: row.get(5)?,
                    },
                    label_name: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(annotations)
    }

    pub fn document_count(&self) -> Result<i64> {
        count(&self.conn, "document")
    }

    pub fn label_count(&self) -> Result<i64> {
        label_count(&self.conn)
    }

    pub fn annotation_count(&self) -> Result<i64> {
        count(&self.conn, "annotation")
    }
}

fn open_file(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::from_write_io(e, parent.to_path_buf()))?;
    }
    Ok(Connection::open(path)?)
}

// ==================== Internal structs ====================

const DOCUMENT_COLUMNS: &str =
    "id, content, content_checksum, display_title, list_title, metadata";

struct DocumentRow {
    id: i64,
    content: String,
    content_checksum: String,
    display_title: Option<String>,
    list_title: Option<String>,
    metadata: Option<String>,
}

impl DocumentRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            content: row.get("content")?,
            content_checksum: row.get("content_checksum")?,
            display_title: row.get("display_title")?,
            list_title: row.get("list_title")?,
            metadata: row.get("metadata")?,
        })
    }

    fn into_document(self) -> Result<Document> {
        let metadata = match self.metadata {
            Some(raw) => Some(serde_json::from_str::<Map<String, Value>>(&raw).map_err(|e| {
                Error::integrity(format!(
                    "metadata of document {} is not a JSON object: {}",
                    self.id, e
                ))
            })?),
            None => None,
        };
        Ok(Document {
            id: self.id,
            content: self.content,
            content_checksum: self.content_checksum,
            display_title: self.display_title,
            list_title: self.list_title,
            metadata,
        })
    }
}

fn query_documents(conn: &Connection, sql: &str) -> Result<Vec<Document>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([], DocumentRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(DocumentRow::into_document).collect()
}

fn count(conn: &Connection, table: &str) -> Result<i64> {
    Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })?)
}

// ==================== Write helpers ====================

pub fn find_document_by_checksum(conn: &Connection, checksum: &str) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT id FROM document WHERE content_checksum = ?",
            params![checksum],
            |row| row.get(0),
        )
        .optional()?)
}

/// Text of a stored document
pub fn document_content(conn: &Connection, id: i64) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT content FROM document WHERE id = ?",
            params![id],
            |row| row.get(0),
        )
        .optional()?)
}

pub fn label_count(conn: &Connection) -> Result<i64> {
    count(conn, "label")
}

pub fn find_label(conn: &Connection, name: &str) -> Result<Option<i64>> {
    Ok(conn
        .query_row("SELECT id FROM label WHERE name = ?", params![name], |row| {
            row.get(0)
        })
        .optional()?)
}

/// Insert a document unless one with the same checksum exists
///
/// An existing document is returned untouched: titles and metadata of the
/// first import win.
pub fn put_document(conn: &Connection, doc: &NewDocument) -> Result<Put> {
    if let Some(id) = find_document_by_checksum(conn, doc.content_checksum())? {
        return Ok(Put::existing(id));
    }

    let metadata = doc
        .metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| Error::integrity(format!("metadata cannot be encoded: {}", e)))?;

    conn.execute(
        r#"
        INSERT INTO document (content, content_checksum, display_title, list_title, metadata)
        VALUES (?, ?, ?, ?, ?)
        "#,
        params![
            doc.content(),
            doc.content_checksum(),
            doc.display_title,
            doc.list_title,
            metadata,
        ],
    )?;
    Ok(Put::created(conn.last_insert_rowid()))
}

/// Get or create a label, returning its ID
///
/// An existing label keeps its shortcut key and color. A shortcut key owned
/// by another label is dropped rather than rejected.
pub fn put_label(
    conn: &Connection,
    name: &str,
    shortcut_key: Option<&str>,
    color: Option<&str>,
) -> Result<LabelPut> {
    if name.is_empty() {
        return Err(Error::integrity("label name must not be empty"));
    }

    if let Some(id) = find_label(conn, name)? {
        return Ok(LabelPut {
            put: Put::existing(id),
            shortcut_dropped: false,
        });
    }

    let mut shortcut_dropped = false;
    let shortcut_key = match shortcut_key {
        Some(key) if shortcut_owner(conn, key)?.is_some() => {
            shortcut_dropped = true;
            None
        }
        other => other,
    };

    conn.execute(
        "INSERT INTO label (name, shortcut_key, color) VALUES (?, ?, ?)",
        params![name, shortcut_key, color],
    )?;
    Ok(LabelPut {
        put: Put::created(conn.last_insert_rowid()),
        shortcut_dropped,
    })
}

fn shortcut_owner(conn: &Connection, key: &str) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT id FROM label WHERE shortcut_key = ?",
            params![key],
            |row| row.get(0),
        )
        .optional()?)
}

/// Insert an annotation unless the same label already covers the same span
///
/// Both references must resolve and the span must lie inside the document's
/// content, otherwise this is an integrity error.
pub fn put_annotation(
    conn: &Connection,
    document_id: i64,
    label_id: i64,
    start_char: usize,
    end_char: usize,
    extra_data: Option<&str>,
) -> Result<Put> {
    // length() in SQLite stops at the first NUL, so count in Rust
    let Some(content) = document_content(conn, document_id)? else {
        return Err(Error::integrity(format!(
            "annotation references missing document {}",
            document_id
        )));
    };

    let label_exists = conn
        .prepare("SELECT 1 FROM label WHERE id = ?")?
        .exists(params![label_id])?;
    if !label_exists {
        return Err(Error::integrity(format!(
            "annotation references missing label {}",
            label_id
        )));
    }

    let text = CharIndices::new(&content);
    if !text.is_valid_span(start_char, end_char) {
        return Err(Error::integrity(format!(
            "span [{}, {}) is not inside document {} ({} characters)",
            start_char,
            end_char,
            document_id,
            text.char_len()
        )));
    }

    let existing: Option<i64> = conn
        .query_row(
            r#"
            SELECT id FROM annotation
            WHERE document_id = ? AND label_id = ? AND start_char = ? AND end_char = ?
            "#,
            params![document_id, label_id, start_char as i64, end_char as i64],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(Put::existing(id));
    }

    conn.execute(
        r#"
        INSERT INTO annotation (document_id, label_id, start_char, end_char, extra_data)
        VALUES (?, ?, ?, ?, ?)
        "#,
        params![
            document_id,
            label_id,
            start_char as i64,
            end_char as i64,
            extra_data.filter(|e| !e.is_empty()),
        ],
    )?;
    Ok(Put::created(conn.last_insert_rowid()))
}

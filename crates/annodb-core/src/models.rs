//! Data models for annodb
//!
//! Rows as they are stored: Document, Label and Annotation. The shapes that
//! travel through files live in [`crate::records`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::checksum::content_checksum;

/// A stored text document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier (creation order)
    pub id: i64,
    /// The text; never empty and never modified once stored
    pub content: String,
    /// MD5 hex digest of `content`, the identity key
    pub content_checksum: String,
    /// Title shown above the text
    pub display_title: Option<String>,
    /// Title shown in document lists
    pub list_title: Option<String>,
    /// Opaque user metadata
    pub metadata: Option<Map<String, Value>>,
}

/// A document that has not been stored yet
///
/// The checksum is always derived from the content, so a `NewDocument`
/// cannot carry a mismatched identity.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDocument {
    content: String,
    content_checksum: String,
    pub display_title: Option<String>,
    pub list_title: Option<String>,
    pub metadata: Option<Map<String, Value>>,
}

impl NewDocument {
    pub fn new(content: impl Into<String>) -> Self {
        let content = content.into();
        let content_checksum = content_checksum(&content);
        Self {
            content,
            content_checksum,
            display_title: None,
            list_title: None,
            metadata: None,
        }
    }

    pub fn with_titles(mut self, display_title: Option<String>, list_title: Option<String>) -> Self {
        self.display_title = display_title;
        self.list_title = list_title;
        self
    }

    pub fn with_metadata(mut self, metadata: Option<Map<String, Value>>) -> Self {
        self.metadata = metadata.filter(|m| !m.is_empty());
        self
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn content_checksum(&self) -> &str {
        &self.content_checksum
    }
}

/// A label that can be attached to spans of text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Label {
    /// Unique identifier (creation order)
    pub id: i64,
    /// Unique, case-sensitive name
    pub name: String,
    /// Single-letter keyboard shortcut, unique when present
    pub shortcut_key: Option<String>,
    /// Display color as `#rrggbb`
    pub color: Option<String>,
}

/// A labelled span of a document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Annotation {
    pub id: i64,
    pub document_id: i64,
    pub label_id: i64,
    /// Character offset of the first annotated character
    pub start_char: usize,
    /// Character offset one past the last annotated character
    pub end_char: usize,
    /// Free-form note or external reference
    pub extra_data: Option<String>,
}

/// Outcome of an insert-if-absent store operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Put {
    /// Id of the inserted or already existing row
    pub id: i64,
    /// Whether a new row was inserted
    pub created: bool,
}

impl Put {
    pub fn created(id: i64) -> Self {
        Self { id, created: true }
    }

    pub fn existing(id: i64) -> Self {
        Self { id, created: false }
    }
}

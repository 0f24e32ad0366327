//! Intermediate records
//!
//! The format-neutral shapes every codec parses into and serializes from.
//! Field names match the JSON keys used by all formats, so the JSON and JSONL
//! codecs are plain serde round trips.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key under which exported records carry the content checksum
pub const CHECKSUM_KEY: &str = "utf8_text_md5_checksum";

/// One document as found in (or written to) an interchange file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocRecord {
    /// Checksum declared by the file; used to find the document when `text` is absent
    #[serde(
        rename = "utf8_text_md5_checksum",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub checksum: Option<String>,

    #[serde(default, alias = "meta", skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// `None` when the file says nothing about annotations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Vec<AnnotationRecord>>,
}

impl DocRecord {
    /// A record carrying only text
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Text, if present and non-empty
    pub fn content(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.is_empty())
    }

    pub fn annotations(&self) -> &[AnnotationRecord] {
        self.annotations.as_deref().unwrap_or(&[])
    }
}

/// One annotation embedded in a document record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_char: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_char: Option<usize>,

    /// UTF-8 offset, used when `start_char` is missing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_byte: Option<usize>,

    /// UTF-8 offset, used when `end_char` is missing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_byte: Option<usize>,

    #[serde(default)]
    pub label_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_data: Option<String>,
}

impl AnnotationRecord {
    pub fn new(start_char: usize, end_char: usize, label_name: impl Into<String>) -> Self {
        Self {
            start_char: Some(start_char),
            end_char: Some(end_char),
            label_name: label_name.into(),
            ..Self::default()
        }
    }

    pub fn with_extra_data(mut self, extra_data: impl Into<String>) -> Self {
        self.extra_data = Some(extra_data.into());
        self
    }
}

/// One label as found in (or written to) an interchange file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRecord {
    #[serde(alias = "text")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortcut_key: Option<String>,
}

impl LabelRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_shortcut_key(mut self, key: impl Into<String>) -> Self {
        self.shortcut_key = Some(key.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_record_accepts_meta_alias() {
        let record: DocRecord =
            serde_json::from_str(r#"{"text": "abc", "meta": {"id": "doc-2"}}"#).unwrap();
        assert_eq!(record.content(), Some("abc"));
        assert_eq!(record.metadata.unwrap()["id"], "doc-2");
    }

    #[test]
    fn test_doc_record_ignores_unknown_keys() {
        let record: DocRecord =
            serde_json::from_str(r#"{"text": "abc", "short_title": "t"}"#).unwrap();
        assert_eq!(record.text.as_deref(), Some("abc"));
        assert!(record.display_title.is_none());
    }

    #[test]
    fn test_empty_text_is_no_content() {
        assert_eq!(DocRecord::from_text("").content(), None);
        assert!(DocRecord::default().annotations().is_empty());
    }

    #[test]
    fn test_serialized_key_order_starts_with_checksum() {
        let record = DocRecord {
            checksum: Some("0".repeat(32)),
            text: Some("abc".to_string()),
            annotations: Some(vec![AnnotationRecord::new(0, 1, "Word")]),
            ..DocRecord::default()
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.starts_with(r#"{"utf8_text_md5_checksum":"#));
        assert!(json.contains(r#""annotations":[{"start_char":0,"end_char":1,"label_name":"Word"}]"#));
    }

    #[test]
    fn test_label_record_accepts_text_alias() {
        let label: LabelRecord =
            serde_json::from_str(r#"{"text": "Number", "shortcut_key": "n", "color": "orange"}"#)
                .unwrap();
        assert_eq!(label.name, "Number");
        assert_eq!(label.shortcut_key.as_deref(), Some("n"));
        assert_eq!(label.color.as_deref(), Some("orange"));
    }
}

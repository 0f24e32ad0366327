//! Interchange formats
//!
//! Each format turns file contents into [`DocRecord`]s / [`LabelRecord`]s and
//! back. The format of a file is decided once from its extension; requesting
//! something a format cannot carry fails before the file is read.
//!
//! | Format | Extension | Documents | Labels |
//! |--------|-----------|-----------|--------|
//! | JSON   | `json`    | yes       | yes    |
//! | JSONL  | `jsonl`   | yes       | yes    |
//! | XML    | `xml`     | yes       | yes    |
//! | CSV    | `csv`     | yes       | yes    |
//! | TXT    | `txt`     | yes       | no     |

pub mod csv;
pub mod json;
pub mod jsonl;
pub mod txt;
pub mod xml;

use std::fmt;
use std::path::Path;

use thiserror::Error;

use crate::error::{Error, Result};
use crate::records::{DocRecord, LabelRecord};

/// Errors raised while parsing or serializing file contents
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("line {line}: {source}")]
    JsonLine {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid CSV: {0}")]
    Csv(#[from] ::csv::Error),

    #[error("invalid XML: {0}")]
    Xml(String),

    /// Well-formed input with the wrong shape
    #[error("{0}")]
    Invalid(String),

    #[error("{format} files cannot carry {capability}")]
    Unsupported {
        format: Format,
        capability: Capability,
    },
}

/// Supported file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    JsonLines,
    Xml,
    Csv,
    Txt,
}

/// What a caller wants to do with a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ParseDocuments,
    ParseLabels,
    WriteDocuments,
    WriteLabels,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Capability::ParseDocuments | Capability::WriteDocuments => "documents",
            Capability::ParseLabels | Capability::WriteLabels => "labels",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Format::Json => "JSON",
            Format::JsonLines => "JSONL",
            Format::Xml => "XML",
            Format::Csv => "CSV",
            Format::Txt => "TXT",
        };
        write!(f, "{}", s)
    }
}

impl Format {
    pub const ALL: [Format; 5] = [
        Format::Json,
        Format::JsonLines,
        Format::Xml,
        Format::Csv,
        Format::Txt,
    ];

    /// Match an extension (without the dot), ignoring case
    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.extension().eq_ignore_ascii_case(ext))
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::JsonLines => "jsonl",
            Format::Xml => "xml",
            Format::Csv => "csv",
            Format::Txt => "txt",
        }
    }

    pub fn supports(&self, capability: Capability) -> bool {
        match self {
            Format::Txt => matches!(
                capability,
                Capability::ParseDocuments | Capability::WriteDocuments
            ),
            _ => true,
        }
    }

    /// Pick the format for `path` and check it can do `capability`
    pub fn resolve(path: &Path, capability: Capability) -> Result<Self> {
        let format = Self::from_path(path).ok_or_else(|| Error::UnsupportedFormat {
            path: path.to_path_buf(),
            reason: "extension not recognized (expected json, jsonl, xml, csv or txt)"
                .to_string(),
        })?;

        if !format.supports(capability) {
            return Err(Error::UnsupportedFormat {
                path: path.to_path_buf(),
                reason: format!("{} files cannot carry {}", format, capability),
            });
        }
        Ok(format)
    }

    fn unsupported(&self, capability: Capability) -> CodecError {
        CodecError::Unsupported {
            format: *self,
            capability,
        }
    }

    pub fn parse_documents(&self, input: &str) -> std::result::Result<Vec<DocRecord>, CodecError> {
        match self {
            Format::Json => json::parse_documents(input),
            Format::JsonLines => jsonl::parse_documents(input),
            Format::Xml => xml::parse_documents(input),
            Format::Csv => csv::parse_documents(input),
            Format::Txt => Ok(txt::parse_documents(input)),
        }
    }

    pub fn parse_labels(&self, input: &str) -> std::result::Result<Vec<LabelRecord>, CodecError> {
        match self {
            Format::Json => json::parse_labels(input),
            Format::JsonLines => jsonl::parse_labels(input),
            Format::Xml => xml::parse_labels(input),
            Format::Csv => csv::parse_labels(input),
            Format::Txt => Err(self.unsupported(Capability::ParseLabels)),
        }
    }

    pub fn write_documents(
        &self,
        records: &[DocRecord],
    ) -> std::result::Result<String, CodecError> {
        match self {
            Format::Json => json::write_documents(records),
            Format::JsonLines => jsonl::write_documents(records),
            Format::Xml => xml::write_documents(records),
            Format::Csv => csv::write_documents(records),
            Format::Txt => Ok(txt::write_documents(records)),
        }
    }

    pub fn write_labels(&self, records: &[LabelRecord]) -> std::result::Result<String, CodecError> {
        match self {
            Format::Json => json::write_labels(records),
            Format::JsonLines => jsonl::write_labels(records),
            Format::Xml => xml::write_labels(records),
            Format::Csv => csv::write_labels(records),
            Format::Txt => Err(self.unsupported(Capability::WriteLabels)),
        }
    }
}

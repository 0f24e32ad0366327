//! annodb Core Library
//!
//! This crate provides the core functionality for annodb, a store for text
//! documents, labels and labelled spans (annotations) that imports and
//! exports JSON, JSON Lines, XML, CSV and plain text.
//!
//! # Architecture
//!
//! - **SQLite**: single source of truth, one file per store (or `:memory:`)
//! - **Codecs**: turn files into format-neutral records and back
//! - **Merge**: applies records to the store; documents are identified by the
//!   MD5 checksum of their text, labels by name
//!
//! # Quick Start
//!
//! ```text
//! let mut engine = Engine::open(&StoreTarget::parse("corpus.annodb"))?;
//!
//! // Import, one transaction per file
//! let batch = engine.import_documents(&["docs.json", "more.csv"]);
//! if !batch.is_success() { ... }
//!
//! // Export annotations only, keyed by checksum
//! let options = ExportOptions { no_text: true, ..ExportOptions::default() };
//! engine.export_documents(Path::new("annotations.jsonl"), &options)?;
//! ```
//!
//! # Modules
//!
//! - `engine`: Import/export orchestration (main entry point)
//! - `storage`: SQLite store, schema and atomic file writes
//! - `merge`: Identity and precedence rules
//! - `codec`: File formats
//! - `records`: Format-neutral document and label records
//! - `models`: Stored rows
//! - `config`: Application configuration

pub mod char_indices;
pub mod checksum;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod merge;
pub mod models;
pub mod records;
pub mod storage;

pub use codec::{Capability, CodecError, Format};
pub use config::Config;
pub use engine::{BatchResult, BatchStatus, Engine, ExportOptions, ExportSummary, FileOutcome};
pub use error::{Error, ErrorKind, Result};
pub use merge::MergeCounts;
pub use models::{Annotation, Document, Label, NewDocument, Put};
pub use records::{AnnotationRecord, DocRecord, LabelRecord};
pub use storage::{Store, StoreTarget};

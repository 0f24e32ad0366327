//! Import/export orchestration
//!
//! `Engine` moves records between files and the store. Each input file is
//! imported in its own transaction: a file either lands completely or not at
//! all, and a failing file never stops the files after it. Exports are
//! assembled in memory and written atomically.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::char_indices::CharIndices;
use crate::codec::{Capability, CodecError, Format};
use crate::error::{Error, Result};
use crate::merge::{apply_documents, apply_labels, MergeCounts};
use crate::models::Document;
use crate::records::{AnnotationRecord, DocRecord, LabelRecord};
use crate::storage::{atomic_write, Store, StoreTarget};

/// Which fields a document export carries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportOptions {
    /// Only documents with at least one annotation
    pub labelled_only: bool,
    /// Leave out text and titles (records keep their checksum)
    pub no_text: bool,
    /// Leave out annotations
    pub no_annotations: bool,
}

/// Result of importing one file
#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub result: Result<MergeCounts>,
}

impl FileOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Overall state of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    /// No files were given
    Empty,
    Success,
    PartialSuccess,
    Failure,
}

/// Per-file outcomes of one import call, in input order
#[derive(Debug, Default)]
pub struct BatchResult {
    pub outcomes: Vec<FileOutcome>,
}

impl BatchResult {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn failed_paths(&self) -> Vec<&Path> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_success())
            .map(|o| o.path.as_path())
            .collect()
    }

    pub fn status(&self) -> BatchStatus {
        match (self.succeeded(), self.failed()) {
            (0, 0) => BatchStatus::Empty,
            (_, 0) => BatchStatus::Success,
            (0, _) => BatchStatus::Failure,
            _ => BatchStatus::PartialSuccess,
        }
    }

    /// True when no file failed
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Counts summed over the files that were imported
    pub fn counts(&self) -> MergeCounts {
        let mut total = MergeCounts::default();
        for counts in self.outcomes.iter().filter_map(|o| o.result.as_ref().ok()) {
            total.add(counts);
        }
        total
    }
}

/// What an export wrote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub format: Format,
    pub records: usize,
}

#[derive(Debug, Clone, Copy)]
enum ImportKind {
    Documents,
    Labels,
}

/// Import/export front end over one store
pub struct Engine {
    store: Store,
}

impl Engine {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn open(target: &StoreTarget) -> Result<Self> {
        Ok(Self::new(Store::open(target)?))
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    // ==================== Imports ====================

    /// Import document files in order
    pub fn import_documents<P: AsRef<Path>>(&mut self, paths: &[P]) -> BatchResult {
        self.import_batch(paths, ImportKind::Documents)
    }

    /// Import label files in order
    pub fn import_labels<P: AsRef<Path>>(&mut self, paths: &[P]) -> BatchResult {
        self.import_batch(paths, ImportKind::Labels)
    }

    fn import_batch<P: AsRef<Path>>(&mut self, paths: &[P], kind: ImportKind) -> BatchResult {
        let outcomes = paths
            .iter()
            .map(|path| {
                let path = path.as_ref();
                let result = self.import_file(path, kind);
                match &result {
                    Ok(counts) => info!("Imported {}: {:?}", path.display(), counts),
                    Err(e) => warn!("Failed to import {}: {}", path.display(), e),
                }
                FileOutcome {
                    path: path.to_path_buf(),
                    result,
                }
            })
            .collect();
        BatchResult { outcomes }
    }

    fn import_file(&mut self, path: &Path, kind: ImportKind) -> Result<MergeCounts> {
        let capability = match kind {
            ImportKind::Documents => Capability::ParseDocuments,
            ImportKind::Labels => Capability::ParseLabels,
        };
        let format = Format::resolve(path, capability)?;
        let input = read_utf8(path)?;
        let input = input.strip_prefix('\u{feff}').unwrap_or(&input);

        let parse_error = |e: CodecError| Error::Parse {
            path: path.to_path_buf(),
            details: e.to_string(),
        };

        // parse fully before touching the store
        let counts = match kind {
            ImportKind::Documents => {
                let records = format.parse_documents(input).map_err(parse_error)?;
                let tx = self.store.transaction()?;
                let counts = apply_documents(&tx, &records)?;
                tx.commit()?;
                counts
            }
            ImportKind::Labels => {
                let records = format.parse_labels(input).map_err(parse_error)?;
                let tx = self.store.transaction()?;
                let counts = apply_labels(&tx, &records)?;
                tx.commit()?;
                counts
            }
        };
        Ok(counts)
    }

    // ==================== Exports ====================

    /// Export documents in creation order
    pub fn export_documents(&self, path: &Path, options: &ExportOptions) -> Result<ExportSummary> {
        let format = Format::resolve(path, Capability::WriteDocuments)?;
        if format == Format::Txt && (options.no_text || !options.no_annotations) {
            return Err(Error::UnsupportedFormat {
                path: path.to_path_buf(),
                reason: "TXT files carry only document text; export with annotations excluded \
                         and text included"
                    .to_string(),
            });
        }

        let documents = if options.labelled_only {
            self.store.list_labelled_documents()?
        } else {
            self.store.list_documents()?
        };

        let records = documents
            .into_iter()
            .map(|doc| self.document_record(doc, options))
            .collect::<Result<Vec<_>>>()?;

        let content = format
            .write_documents(&records)
            .map_err(|e| serialize_error(path, e))?;
        atomic_write(path, content.as_bytes())?;

        info!(
            "Exported {} document(s) to {}",
            records.len(),
            path.display()
        );
        Ok(ExportSummary {
            path: path.to_path_buf(),
            format,
            records: records.len(),
        })
    }

    fn document_record(&self, doc: Document, options: &ExportOptions) -> Result<DocRecord> {
        let annotations = if options.no_annotations {
            None
        } else {
            let index = CharIndices::new(&doc.content);
            let annotations = self
                .store
                .list_annotations(doc.id)?
                .into_iter()
                .map(|named| {
                    let start = named.annotation.start_char;
                    let end = named.annotation.end_char;
                    AnnotationRecord {
                        start_char: Some(start),
                        end_char: Some(end),
                        start_byte: index.char_to_byte(start),
                        end_byte: index.char_to_byte(end),
                        label_name: named.label_name,
                        extra_data: named.annotation.extra_data.filter(|e| !e.is_empty()),
                    }
                })
                .collect();
            Some(annotations)
        };

        let (text, display_title, list_title) = if options.no_text {
            (None, None, None)
        } else {
            (Some(doc.content), doc.display_title, doc.list_title)
        };

        Ok(DocRecord {
            checksum: Some(doc.content_checksum),
            metadata: doc.metadata,
            display_title,
            list_title,
            text,
            annotations,
        })
    }

    /// Export all labels in creation order
    pub fn export_labels(&self, path: &Path) -> Result<ExportSummary> {
        let format = Format::resolve(path, Capability::WriteLabels)?;

        let records: Vec<LabelRecord> = self
            .store
            .list_labels()?
            .into_iter()
            .map(|label| LabelRecord {
                name: label.name,
                color: label.color,
                shortcut_key: label.shortcut_key,
            })
            .collect();

        let content = format
            .write_labels(&records)
            .map_err(|e| serialize_error(path, e))?;
        atomic_write(path, content.as_bytes())?;

        info!("Exported {} label(s) to {}", records.len(), path.display());
        Ok(ExportSummary {
            path: path.to_path_buf(),
            format,
            records: records.len(),
        })
    }

    pub fn vacuum(&self) -> Result<()> {
        self.store.vacuum()?;
        info!("Vacuumed {}", self.store.target());
        Ok(())
    }
}

fn read_utf8(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| Error::from_io(e, path.to_path_buf()))?;
    String::from_utf8(bytes).map_err(|e| Error::Parse {
        path: path.to_path_buf(),
        details: format!("file is not valid UTF-8 ({})", e.utf8_error()),
    })
}

fn serialize_error(path: &Path, e: CodecError) -> Error {
    Error::Write {
        path: path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::InvalidData, e.to_string()),
    }
}

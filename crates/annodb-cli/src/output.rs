//! Output formatting for CLI
//!
//! Provides consistent output formatting across all operations:
//! - Human-readable default output
//! - JSON output (--json flag), one object per operation
//! - Quiet mode for scripting (--quiet flag): failures only, on stderr

use std::path::Path;

use serde_json::{json, Value};

use annodb_core::{BatchResult, BatchStatus, Error, ExportSummary, MergeCounts};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print the per-file outcome of an import
    pub fn print_batch(&self, operation: &str, batch: &BatchResult) {
        match self.format {
            OutputFormat::Human => {
                for outcome in &batch.outcomes {
                    match &outcome.result {
                        Ok(counts) => println!(
                            "✓ {} ({})",
                            outcome.path.display(),
                            describe_counts(counts)
                        ),
                        Err(e) => println!("✗ {}: {}", outcome.path.display(), e),
                    }
                }
                println!(
                    "{}: {} of {} file(s) imported",
                    operation,
                    batch.succeeded(),
                    batch.outcomes.len()
                );
            }
            OutputFormat::Json => {
                println!("{}", batch_json(operation, batch));
            }
            OutputFormat::Quiet => {
                for outcome in &batch.outcomes {
                    if let Err(e) = &outcome.result {
                        eprintln!("{}: {}", outcome.path.display(), e);
                    }
                }
            }
        }
    }

    /// Print what an export wrote
    pub fn print_export(&self, operation: &str, summary: &ExportSummary) {
        match self.format {
            OutputFormat::Human => println!(
                "✓ {}: {} record(s) written to {} ({})",
                operation,
                summary.records,
                summary.path.display(),
                summary.format
            ),
            OutputFormat::Json => println!("{}", export_json(operation, summary)),
            OutputFormat::Quiet => {}
        }
    }

    /// Report an operation that failed as a whole
    pub fn print_failure(&self, operation: &str, path: &Path, error: &Error) {
        match self.format {
            OutputFormat::Json => println!(
                "{}",
                json!({
                    "operation": operation,
                    "status": "failure",
                    "path": path.display().to_string(),
                    "error": error.to_string(),
                })
            ),
            OutputFormat::Human | OutputFormat::Quiet => {
                eprintln!("✗ {}: {}", operation, error);
                if let Some(hint) = error.recovery_suggestion() {
                    eprintln!("  {}", hint);
                }
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a fatal error (always shown, on stderr unless JSON was asked for)
    pub fn error(&self, message: &str, hint: Option<&str>) {
        match self.format {
            OutputFormat::Json => {
                println!(
                    "{}",
                    json!({"status": "error", "message": message, "hint": hint})
                );
            }
            OutputFormat::Human | OutputFormat::Quiet => {
                eprintln!("Error: {}", message);
                if let Some(hint) = hint {
                    eprintln!("  {}", hint);
                }
            }
        }
    }
}

fn status_label(status: BatchStatus) -> &'static str {
    match status {
        BatchStatus::Empty => "empty",
        BatchStatus::Success => "success",
        BatchStatus::PartialSuccess => "partial_success",
        BatchStatus::Failure => "failure",
    }
}

/// Short summary of the non-zero counts, e.g. "2 documents created, 1 skipped"
fn describe_counts(counts: &MergeCounts) -> String {
    let parts: Vec<String> = [
        (counts.documents_created, "document(s) created"),
        (counts.documents_matched, "document(s) already present"),
        (counts.annotations_created, "annotation(s) created"),
        (counts.annotations_existing, "annotation(s) already present"),
        (counts.labels_created, "label(s) created"),
        (counts.labels_matched, "label(s) already present"),
        (counts.shortcut_keys_dropped, "shortcut key(s) dropped"),
        (counts.records_skipped, "record(s) skipped"),
    ]
    .into_iter()
    .filter(|(n, _)| *n > 0)
    .map(|(n, what)| format!("{} {}", n, what))
    .collect();

    if parts.is_empty() {
        "nothing to import".to_string()
    } else {
        parts.join(", ")
    }
}

fn batch_json(operation: &str, batch: &BatchResult) -> Value {
    let files: Vec<Value> = batch
        .outcomes
        .iter()
        .map(|outcome| match &outcome.result {
            Ok(counts) => json!({
                "path": outcome.path.display().to_string(),
                "status": "success",
                "counts": counts,
            }),
            Err(e) => json!({
                "path": outcome.path.display().to_string(),
                "status": "failure",
                "error": e.to_string(),
            }),
        })
        .collect();

    json!({
        "operation": operation,
        "status": status_label(batch.status()),
        "succeeded": batch.succeeded(),
        "failed": batch.failed(),
        "counts": batch.counts(),
        "files": files,
    })
}

fn export_json(operation: &str, summary: &ExportSummary) -> Value {
    json!({
        "operation": operation,
        "status": "success",
        "path": summary.path.display().to_string(),
        "format": summary.format.extension(),
        "records": summary.records,
    })
}

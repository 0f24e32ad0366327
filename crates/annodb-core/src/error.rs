//! Error handling
//!
//! Provides typed errors for store, codec and batch operations with the path
//! that caused them. The import orchestrator downgrades most of these to a
//! per-file failure; only `Config` is fatal for a whole invocation.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while opening the store or moving data in and out
#[derive(Error, Debug)]
pub enum Error {
    /// File extension not recognized, or the format cannot carry this kind of item
    #[error("Unsupported format for '{path}': {reason}")]
    UnsupportedFormat { path: PathBuf, reason: String },

    /// Input file does not exist
    #[error("File not found: '{path}'")]
    NotFound { path: PathBuf },

    /// File matched a codec but its content violates that format
    #[error("Could not parse '{path}': {details}")]
    Parse { path: PathBuf, details: String },

    /// A record references something that cannot be resolved
    #[error("Integrity error: {details}")]
    Integrity { details: String },

    /// Missing or invalid configuration (e.g. no store path given)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The target file is a SQLite database that was not created by annodb
    #[error("'{path}' is not an annodb database (or was created by an incompatible version)")]
    NotAStore { path: PathBuf },

    /// Permission denied accessing path
    #[error("Permission denied: cannot access '{path}'. Check file permissions.")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to read file
    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write file
    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// SQLite database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnsupportedFormat,
    NotFound,
    Parse,
    Integrity,
    Config,
    Io,
    Database,
}

impl Error {
    /// Create a read error from an I/O error with path context
    ///
    /// Missing files and permission problems get their own variants.
    pub fn from_io(error: io::Error, path: PathBuf) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => Error::NotFound { path },
            io::ErrorKind::PermissionDenied => Error::PermissionDenied {
                path,
                source: error,
            },
            _ => Error::Read {
                path,
                source: error,
            },
        }
    }

    /// Same as [`Error::from_io`] for the output side
    pub fn from_write_io(error: io::Error, path: PathBuf) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => Error::PermissionDenied {
                path,
                source: error,
            },
            _ => Error::Write {
                path,
                source: error,
            },
        }
    }

    pub fn integrity(details: impl Into<String>) -> Self {
        Error::Integrity {
            details: details.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Parse { .. } => ErrorKind::Parse,
            Error::Integrity { .. } => ErrorKind::Integrity,
            Error::Config(_) => ErrorKind::Config,
            Error::NotAStore { .. } | Error::Database(_) => ErrorKind::Database,
            Error::PermissionDenied { .. } | Error::Read { .. } | Error::Write { .. } => {
                ErrorKind::Io
            }
        }
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Error::UnsupportedFormat { .. } => Some(
                "Rename the file with one of the recognized extensions: json, jsonl, xml, csv, txt.",
            ),
            Error::Config(_) => {
                Some("Pass a database path (or :memory:) or set ANNODB_DATABASE.")
            }
            Error::PermissionDenied { .. } => {
                Some("Check file and directory permissions.")
            }
            Error::NotAStore { .. } => {
                Some("Choose a new file name; existing non-annodb databases are never modified.")
            }
            _ => None,
        }
    }
}

/// Result type for annodb operations
pub type Result<T> = std::result::Result<T, Error>;

//! Store errors.

use std::path::PathBuf;

use thiserror::Error;

/// Failure reading or writing a JSON record.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure parsing a user document.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("File {name:?} not found in documents directory. Available files: {}", .available.join(", "))]
    NotFound { name: String, available: Vec<String> },
    #[error("Documents directory does not exist ({0})")]
    MissingDirectory(PathBuf),
    #[error("{0:?} is not a valid document name")]
    InvalidName(String),
    #[error("{0:?} is not a regular file")]
    NotAFile(String),
    #[error(
        "Unsupported file type {ext:?} for file {name:?}. Supported types: .pdf, .jpg, .jpeg, .png, .webp, .txt, .md, .csv"
    )]
    Unsupported { name: String, ext: String },
    #[error("Failed to parse {name:?}: {message}")]
    Parse { name: String, message: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

//! Error taxonomy for ingestion and query serving.
//!
//! Only a few conditions are real errors. Malformed lines, coercion rejections
//! and failed batches are counted in the import report instead.

use std::path::PathBuf;
use thiserror::Error;

/// A source file could not be used at all.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The file is missing or cannot be opened.
    #[error("source unavailable: {path}: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The stream could not be decompressed or its header could not be read.
    #[error("cannot decode {path}: {message}")]
    Decompress { path: PathBuf, message: String },

    /// Locating the file inside the dataset directory failed.
    #[error("cannot search {dir} for source files: {message}")]
    Discover { dir: PathBuf, message: String },
}

/// Storage-level failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid store configuration: {0}")]
    Config(String),

    #[error("refusing to reset {0} without explicit confirmation")]
    ResetNotConfirmed(PathBuf),
}

/// Errors that abort an import. Everything else is absorbed into counters.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The target store cannot be opened or its schema cannot be created.
    #[error("cannot prepare target store: {0}")]
    SchemaFatal(#[source] StoreError),

    #[error("invalid import configuration: {0}")]
    Config(String),
}

/// Errors reported to callers of the query service.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("unknown entity kind '{0}'")]
    UnknownKind(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The store exists but has not reached the finalized phase.
    #[error("store is not ready for queries (phase: {0})")]
    NotReady(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
}

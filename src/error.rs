//! Error taxonomy for the ETL run.
//!
//! Input, cache and store errors are fatal. HTTP errors never leave the
//! fetcher: they are logged and degraded to the "Data not available" entry.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EtlError>;

#[derive(Debug, Error)]
pub enum EtlError {
    /// Missing or malformed CSV input.
    #[error("failed to read input file '{}': {source}", .path.display())]
    Input {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to open input file '{}': {source}", .path.display())]
    InputIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("enrichment cache I/O failed for '{}': {source}", .path.display())]
    CacheIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The cache file exists but is not a valid title -> details mapping.
    #[error("enrichment cache '{}' is corrupt: {source}", .path.display())]
    CacheCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("relational store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("metadata request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("resolver pool failed: {0}")]
    WorkerPool(String),
}

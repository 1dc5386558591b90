//! Crate-wide error type.
//!
//! Some variants abort a run (`ScanFailure`, `EmbeddingProviderFailure`,
//! `VectorStoreFailure`), some are logged and skipped by the caller
//! (`FileReadFailure`, `ParseFailure`), and one is logged-but-non-fatal
//! (`CachePersistFailure`). Corrupt on-disk state (cache, Merkle summary) is
//! never surfaced as an error — callers reset to empty at the load site —
//! so there is no variant for it here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("failed to scan root: {0}")]
    ScanFailure(String),

    #[error("failed to read file {path}")]
    FileReadFailure {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {reason}")]
    ParseFailure { path: String, reason: String },

    #[error("embedding provider failed: {0}")]
    EmbeddingProviderFailure(String),

    #[error("vector store {operation} failed: {message}")]
    VectorStoreFailure { operation: String, message: String },

    #[error("failed to persist embedding cache: {0}")]
    CachePersistFailure(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;

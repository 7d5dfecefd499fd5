//! Error types for the TPS library.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by pattern mining, storage, and substitution.
///
/// Empty corpora, empty stores, and inputs with no matching patterns are
/// normal states and never surface as errors.
#[derive(Debug, Error)]
pub enum TpsError {
    /// A pattern id is not present in the store.
    #[error("Pattern not found: {0}")]
    NotFound(String),

    /// A persisted snapshot could not be parsed.
    #[error("Malformed pattern store {path}: {source}")]
    Format {
        /// Location of the offending snapshot.
        path: PathBuf,
        /// Underlying parse failure.
        #[source]
        source: serde_json::Error,
    },

    /// A snapshot could not be serialized.
    #[error("Failed to serialize pattern store: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Any I/O failure other than a missing snapshot on load.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A bracket span looked like a REF token but does not parse as one.
    #[error("Malformed reference token: {0}")]
    MalformedReference(String),

    /// A REF token names a version the store no longer holds.
    #[error("Stale reference to {id}: store has v{expected}, token has v{found}")]
    StaleReference {
        /// Pattern id carried by the token.
        id: String,
        /// Version currently held by the store.
        expected: u32,
        /// Version carried by the token.
        found: u32,
    },
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, TpsError>;

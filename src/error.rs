//! Crate-level error type.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the knowledge engine and its persistence layer.
///
/// Missing or corrupt store files are NOT represented here; they are
/// recovered locally by reinitializing an empty store. Only structural and
/// storage failures reach the caller.
#[derive(Debug, Error)]
pub enum KbError {
    /// The store file could not be written (disk full, permissions, rename
    /// failure). Fatal to the triggering operation.
    #[error("failed to persist knowledge store to {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The in-memory store could not be encoded as JSON.
    #[error("failed to encode knowledge store: {0}")]
    Encode(#[from] serde_json::Error),

    /// An import payload failed structural validation (not a JSON object, or
    /// no `solutions` array). The whole import is rejected; nothing is
    /// committed.
    #[error("invalid import payload: {0}")]
    InvalidImport(String),

    /// A configuration file was present but could not be parsed.
    #[error("failed to load config {}: {reason}", path.display())]
    Config { path: PathBuf, reason: String },
}

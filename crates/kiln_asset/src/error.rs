//! Error types for registry and importer operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from registry bookkeeping.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("no importer registered for extension '{0}'")]
    UnknownExtension(String),

    #[error("path {0:?} is not under any watch root")]
    OutsideRoots(PathBuf),
}

/// Errors from a per-type import function.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("malformed {kind} source {path:?}: {message}")]
    Malformed {
        kind: &'static str,
        path: PathBuf,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

//! Error types for the managed runtime boundary.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while bootstrapping the managed runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The loader could not tell where this module lives.
    #[error("Failed to locate own module: {0}")]
    SelfLocation(String),

    /// A path could not be normalized (usually because it does not exist).
    #[error("Failed to resolve path {path:?}: {source}")]
    PathResolution {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The native dependency could not be loaded.
    #[error("Failed to preload {library}: {reason}")]
    Preload { library: String, reason: String },

    /// A runtime API function is not visible in the process.
    #[error("Runtime symbol not found: {0}")]
    MissingSymbol(&'static str),

    /// The runtime raised while importing an extension module.
    #[error("Failed to import module {module}: {reason}")]
    Import { module: String, reason: String },

    /// The runtime rejected a search path.
    #[error("Failed to append search path {path:?}: {reason}")]
    SearchPath { path: PathBuf, reason: String },

    /// The global lock could not be handed off.
    #[error("Global lock error: {0}")]
    Lock(String),

    /// A string handed to the runtime contained an interior NUL byte.
    #[error("Invalid string for runtime call: {0:?}")]
    InvalidString(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

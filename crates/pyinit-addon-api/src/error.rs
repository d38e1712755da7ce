//! Error types for addon lifecycle and registration.

use pyinit_runtime::RuntimeError;
use thiserror::Error;

/// Errors returned by addons and the addon registry.
#[derive(Error, Debug)]
pub enum AddonError {
    /// An addon with this name is already registered.
    #[error("Addon already registered: {0}")]
    AlreadyRegistered(String),

    /// No addon with this name is registered.
    #[error("Addon not found: {0}")]
    NotFound(String),

    /// A lifecycle call arrived in a phase that does not accept it.
    #[error("Addon {addon} cannot {operation} while {phase}")]
    InvalidPhase {
        addon: String,
        operation: &'static str,
        phase: String,
    },

    /// The managed runtime failed underneath the addon.
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

/// Result type for addon operations.
pub type AddonResult<T> = std::result::Result<T, AddonError>;

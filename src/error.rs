//! Error types for the Storage Grid Reconciler
//!
//! Provides structured error types for request validation, precondition
//! checks, controller mutations and the CLI surface.

use thiserror::Error;

/// Unified error type for the reconciler
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Request Errors
    // =========================================================================
    #[error("Invalid argument specification: {0}")]
    Validation(String),

    #[error("Precondition not met: {0}")]
    PreconditionNotMet(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    // =========================================================================
    // Controller Errors
    // =========================================================================
    #[error("Failed to {operation} '{resource}', error was '{reason}'")]
    RemoteMutationFailure {
        resource: String,
        operation: String,
        reason: String,
    },

    #[error("Controller rejected request: {0}")]
    Controller(String),

    #[error("Controller transport error: {0}")]
    Transport(String),

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("Capacity parse error: {0}")]
    CapacityParse(String),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification used to decide how a failure is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or contradictory request, detected before any lookup
    Validation,
    /// A referenced parent, pool or resource does not exist
    PreconditionNotMet,
    /// The controller rejected a mutation
    RemoteMutationFailure,
    /// Operation intentionally not implemented, reported as unchanged
    Unsupported,
    /// Lookup or call could not reach the controller
    Transport,
    /// Everything else
    Internal,
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) | Error::CapacityParse(_) => ErrorKind::Validation,
            Error::PreconditionNotMet(_) => ErrorKind::PreconditionNotMet,
            Error::RemoteMutationFailure { .. } | Error::Controller(_) => {
                ErrorKind::RemoteMutationFailure
            }
            Error::Unsupported(_) => ErrorKind::Unsupported,
            Error::Transport(_) => ErrorKind::Transport,
            _ => ErrorKind::Internal,
        }
    }

    /// True when the error was raised before any mutation could run
    pub fn is_pre_mutation(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Validation | ErrorKind::PreconditionNotMet | ErrorKind::Unsupported
        )
    }

    /// Attach the resource and operation a mutation failed on.
    ///
    /// Controller rejections become [`Error::RemoteMutationFailure`]; a lost
    /// connection stays [`Error::Transport`] so it is not reported as a
    /// refusal.
    pub fn mutation(resource: impl Into<String>, operation: impl Into<String>, source: Error) -> Self {
        let (resource, operation) = (resource.into(), operation.into());
        match source {
            Error::Transport(reason) => Error::Transport(format!(
                "{} '{}' did not reach the controller: {}",
                operation, resource, reason
            )),
            Error::Controller(reason) => Error::RemoteMutationFailure {
                resource,
                operation,
                reason,
            },
            other => Error::RemoteMutationFailure {
                resource,
                operation,
                reason: other.to_string(),
            },
        }
    }
}

/// Result type alias for the reconciler
pub type Result<T> = std::result::Result<T, Error>;

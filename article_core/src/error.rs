//! Error types for the generation pipeline.

use std::path::PathBuf;

use offer_facts::ValidationError;

use crate::session::SessionState;

/// Failures reported by the generation collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// The stream broke off before its final chunk.
    #[error("generation stream interrupted: {0}")]
    Transport(String),

    /// The collaborator refused or could not start the request.
    #[error("generation unavailable: {0}")]
    Unavailable(String),
}

/// Failures reported by the retrieval collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetrievalError {
    #[error("retrieval backend failed: {0}")]
    Backend(String),
}

/// Outline planning failures.
#[derive(Debug, thiserror::Error)]
pub enum PlanningError {
    #[error("malformed outline: {0}")]
    Malformed(String),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("outline planning failed after {attempts} attempt(s): {last}")]
    Exhausted {
        attempts: u32,
        last: Box<PlanningError>,
    },
}

/// Reasons a generation session ends in `Failed`, plus misuse of the state machine.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Planning(#[from] PlanningError),

    #[error("invalid session transition from {from} to {to}")]
    InvalidTransition { from: SessionState, to: SessionState },

    #[error("session task stopped unexpectedly: {0}")]
    Aborted(String),
}

/// Configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}

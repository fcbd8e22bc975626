use dbs_api::{IllegalTransition, ValidationError};
use thiserror::Error;

/// Crate-level error type. Every fallible public entry point of the engine
/// returns `Result<T, MigrationError>`; no `.unwrap()`/`.expect()` appears
/// outside tests.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("remote source unavailable: {0}")]
    RemoteUnavailable(#[from] dbs_remote::RemoteError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("migration input '{input}' is already queued for '{create_by}'")]
    AlreadyQueued { input: String, create_by: String },

    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),

    #[error("store error: {0}")]
    Store(String),

    #[error("processor deadline exceeded after {0}s")]
    Timeout(u64),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, MigrationError>;

//! Error types for the Asteria world engine

use thiserror::Error;

/// Main error type for the engine.
///
/// Gameplay edits never surface these; they are reserved for the boundaries
/// where data enters or leaves the core (configuration, persistence).
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Persistence error: {0}")]
    Persist(String),

    #[error("Generation error: {0}")]
    Generation(String),
}

//! Error types for calmtrace
//!
//! Most scoring operations degrade instead of failing. These errors surface
//! only from loaders, parsers and configuration validation.

use thiserror::Error;

/// Errors that can occur while loading, parsing or configuring the engine
#[derive(Debug, Error)]
pub enum StressError {
    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Feature vector must have {expected} components, got {actual}")]
    InvalidVector { expected: usize, actual: usize },

    #[error("Model error: {0}")]
    ModelError(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Invalid input event: {0}")]
    InvalidEvent(String),
}

//! Error types for the entire crate.
//!
//! We use `thiserror` for library-style errors, one enum per concern.
//! Capture hooks never return these: failures inside a hook are logged
//! and swallowed so the instrumented query is unaffected.

use thiserror::Error;

/// Invalid start/stop transition on a profiling session
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    #[error("Profiling session is already started")]
    AlreadyStarted,

    #[error("Profiling session is already stopped")]
    AlreadyStopped,
}

/// Operation not available with the session's configuration
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Can't collect queries when a custom collect function is registered")]
    CollectorDisabled,
}

/// Statements the built-in SQL pretty-printer refuses to format
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Unterminated string literal in statement")]
    UnbalancedQuotes,

    #[error("Unbalanced parentheses in statement")]
    UnbalancedParens,
}

/// Any error surfaced by the public API
#[derive(Error, Debug)]
pub enum TapError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("Failed to serialize report summary: {0}")]
    Serialization(#[from] serde_json::Error),
}

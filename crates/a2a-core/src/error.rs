//! Error types for the A2A core library.

use thiserror::Error;

/// Result type alias using the core `Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for A2A operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A task request was built with an empty agent identifier
    #[error("agent_id must not be empty")]
    EmptyAgentId,

    /// Unknown priority literal
    #[error("Invalid priority {0:?}: expected LOW, NORMAL or HIGH")]
    InvalidPriority(String),

    /// A wire payload decoded to something other than a JSON object
    #[error("Expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

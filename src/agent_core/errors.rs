//! Agent Core error types.
//!
//! Model and tool failures never show up here: the loops turn them into
//! conversation text. These errors cover setup and the thread store.

use thiserror::Error;

use crate::inference::InferenceError;

/// Errors that can occur during agent core operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Database operation failed.
    #[error("database error: {reason}")]
    DatabaseError { reason: String },

    /// Thread not found in the store.
    #[error("thread not found: '{thread_id}'")]
    ThreadNotFound { thread_id: String },

    /// Serialization error.
    #[error("serialization error: {reason}")]
    SerializationError { reason: String },

    /// Invalid configuration.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// The model client could not be constructed.
    #[error("model client error: {reason}")]
    ModelClientError { reason: String },

    /// A plan could not be decoded from structured input.
    #[error("invalid plan: {reason}")]
    InvalidPlan { reason: String },
}

impl From<rusqlite::Error> for AgentError {
    fn from(e: rusqlite::Error) -> Self {
        AgentError::DatabaseError {
            reason: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::SerializationError {
            reason: e.to_string(),
        }
    }
}

impl From<InferenceError> for AgentError {
    fn from(e: InferenceError) -> Self {
        match e {
            InferenceError::ConfigError { reason } => AgentError::ConfigError { reason },
            other => AgentError::ModelClientError {
                reason: other.to_string(),
            },
        }
    }
}

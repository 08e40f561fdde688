//! Error types for agent-runner

use std::time::Duration;

use thiserror::Error;

use crate::turn::TurnState;

/// Result type alias for runner operations
pub type Result<T> = std::result::Result<T, RunnerError>;

/// Errors that can occur while compiling or running an agent turn
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Agent definition violates a structural invariant
    #[error("Invalid agent definition: {message}")]
    Definition { message: String },

    /// The model backend failed
    #[error("Model invocation failed: {message}")]
    ModelInvocation { message: String },

    /// A model call exceeded its time bound
    #[error("Model call timed out after {after:?}")]
    Timeout { after: Duration },

    /// The run was cancelled by the caller
    #[error("Run cancelled")]
    Cancelled,

    /// A storage operation failed
    #[error("Persistence error: {0}")]
    Persistence(#[from] chat_core::Error),

    /// A record the turn depends on does not exist
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The streamed response is not correctly framed
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Turn state machine was driven out of order
    #[error("Invalid turn transition from {from:?} to {to:?}")]
    InvalidTransition { from: TurnState, to: TurnState },
}

impl RunnerError {
    /// Create a Definition error
    pub fn definition(message: impl Into<String>) -> Self {
        Self::Definition {
            message: message.into(),
        }
    }

    /// Create a ModelInvocation error
    pub fn model(message: impl Into<String>) -> Self {
        Self::ModelInvocation {
            message: message.into(),
        }
    }

    /// Create a Protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a NotFound error
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

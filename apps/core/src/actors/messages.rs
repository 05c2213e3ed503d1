use serde::Serialize;
use tokio::sync::oneshot;

use crate::models::{ChatMessage, Turn, TurnOutcome};

/// Failures of the model gateway.
///
/// Every variant is recoverable for the current turn; none of them is fatal to the process.
#[derive(Debug, thiserror::Error, Serialize, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The request never produced an HTTP response.
    #[error("network failure: {0}")]
    Network(String),
    /// The request or the response body did not complete in time.
    #[error("request timed out: {0}")]
    Timeout(String),
    /// The service rejected the credentials (401/403).
    #[error("authentication rejected with status {status}: {body}")]
    Auth { status: u16, body: String },
    /// The service asked us to slow down (429).
    #[error("rate limited: {0}")]
    RateLimited(String),
    /// Any other non-success status.
    #[error("completion request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    /// A success status whose body was not a chat completion.
    #[error("malformed completion response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Timeout(err.to_string())
        } else if err.is_decode() {
            BackendError::Malformed(err.to_string())
        } else {
            BackendError::Network(err.to_string())
        }
    }
}

impl From<tokio::time::error::Elapsed> for BackendError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        BackendError::Timeout(err.to_string())
    }
}

// Re-export AppError for convenience
pub use crate::error::AppError;

/// Messages that can be sent to the `LlmActor`.
#[derive(Debug)]
pub enum LlmMessage {
    /// A single chat completion.
    Complete {
        messages: Vec<ChatMessage>,
        model: String,
        /// A channel to send the completion text back.
        responder: oneshot::Sender<Result<String, AppError>>,
    },
}

/// Messages that can be sent to the `SupervisorActor`.
#[derive(Debug)]
pub enum SupervisorMessage {
    /// Run one user turn through the workflow for a session.
    ProcessTurn {
        session_id: String,
        content: String,
        /// Model to use for this turn; `None` keeps the session's current model.
        model_id: Option<String>,
        responder: oneshot::Sender<Result<TurnOutcome, AppError>>,
    },
    /// Drop every turn and the active code artifact of a session.
    ClearSession {
        session_id: String,
        responder: oneshot::Sender<Result<(), AppError>>,
    },
    /// Select another model for a session. Clears the session.
    SwitchModel {
        session_id: String,
        model_id: String,
        responder: oneshot::Sender<Result<String, AppError>>,
    },
    /// Snapshot of a session's turns, oldest first.
    History {
        session_id: String,
        responder: oneshot::Sender<Result<Vec<Turn>, AppError>>,
    },
    /// A command to shut down the supervisor.
    Shutdown,
}

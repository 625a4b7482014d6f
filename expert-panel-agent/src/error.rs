//! Consultation errors

use expert_panel_providers::InvocationErrorKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsultationError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session already completed: {0}")]
    SessionAlreadyCompleted(String),

    #[error("Session already started: {0}")]
    SessionAlreadyStarted(String),

    /// The coordinator call failed; the session has been marked failed
    #[error("Coordinator invocation failed for session {session_id} ({kind}): {message}")]
    CoordinatorInvocationFailure {
        session_id: String,
        kind: InvocationErrorKind,
        message: String,
    },

    #[error("Session store error: {0}")]
    Store(#[from] expert_panel_core::Error),
}

pub type ConsultationResult<T> = Result<T, ConsultationError>;

use thiserror::Error;

use crate::types::MessageRole;

/// Contract violations inside the message store. These indicate a sequencing
/// bug in the calling controller, not a recoverable runtime condition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("an optimistic {role:?} message is already pending")]
    InvalidState { role: MessageRole },
    #[error("no assistant message is currently running")]
    NoActiveTurn,
    #[error("page is not strictly older than the loaded history")]
    OutOfOrderPage,
}

/// Errors surfaced by the session controllers. Everything except `Store` is
/// externally caused and recovers to a consistent state before returning.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("message content is empty")]
    EmptyContent,
    #[error("no agent is selected for this conversation")]
    NoAgentSelected,
    #[error("a turn is already running for this conversation")]
    TurnInProgress,
    #[error("node rejected the send: {reason}")]
    Submission { reason: String },
    #[error("event stream failed: {reason}")]
    Stream { reason: String },
    #[error("failed to fetch older history: {reason}")]
    Pagination { reason: String },
    #[error("stop request failed: {reason}")]
    Stop { reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SessionError {
    /// Validation errors are rejected before any network call and leave the
    /// session untouched.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SessionError::EmptyContent
                | SessionError::NoAgentSelected
                | SessionError::TurnInProgress
        )
    }
}

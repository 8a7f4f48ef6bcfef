use serde::Serialize;
use thiserror::Error;

use crate::messaging::domain::channel::ChannelError;
use crate::session::domain::capture_session::SessionState;

/// Failures surfaced to control surfaces.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SessionError {
    /// The target does not meet the domain precondition. User-correctable.
    #[error("target {target} is not supported: {reason}")]
    TargetUnsupported { target: String, reason: String },

    /// The isolated processing context could not be provisioned or never became ready.
    #[error("processing context unavailable: {0}")]
    ContextUnavailable(String),

    /// Permission denied or the source went away; the session was stopped.
    #[error("stream acquisition failed: {0}")]
    StreamAcquisitionFailed(String),

    /// A peer context could not be reached.
    #[error("channel unreachable: {0}")]
    ChannelUnreachable(String),

    /// The classifier failed to load; frames are reported as no-face until resolved.
    #[error("classifier failed to initialize: {0}")]
    ModelInitFailed(String),

    #[error("{request} is not valid while the session is {state:?}")]
    InvalidState {
        request: &'static str,
        state: SessionState,
    },

    /// A session is already running on a different target.
    #[error("a session is already running on {0}")]
    Busy(String),
}

impl SessionError {
    /// Whether retrying the same request later can succeed without user action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SessionError::ContextUnavailable(_) | SessionError::ChannelUnreachable(_)
        )
    }
}

impl From<ChannelError> for SessionError {
    fn from(e: ChannelError) -> Self {
        SessionError::ChannelUnreachable(e.to_string())
    }
}

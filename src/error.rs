use std::time::Duration;

use thiserror::Error;

/// Failure talking to the Smart Life Manager backend.
///
/// Every variant is terminal for the turn that hit it; callers report it once
/// and wait for the user to reissue the command.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend did not answer within {0:?}")]
    Timeout(Duration),

    #[error("backend unreachable: {0}")]
    Transport(String),

    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected backend response: {0}")]
    Decode(String),
}

impl BackendError {
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            BackendError::Timeout(timeout)
        } else if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else {
            BackendError::Transport(err.to_string())
        }
    }
}

use thiserror::Error;

use crate::capture::CaptureError;

/// Failure appending to the audit log. Never fatal to the session.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("audit log write failed: {0}")]
    WriteFailed(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ProctorError {
    /// The session store could not create a session; the exam cannot start.
    #[error("session store unavailable: {0:#}")]
    StoreUnavailable(#[source] anyhow::Error),

    #[error("violation detection failed: {0}")]
    DetectionFailure(String),

    #[error(transparent)]
    LogWriteFailed(#[from] LogError),

    #[error("frame source failure: {0}")]
    FrameSourceFailure(String),

    #[error("exam already started")]
    AlreadyStarted,

    #[error("exam already finished; start a new controller for another session")]
    AlreadyStopped,

    #[error("no exam in progress")]
    NotRunning,
}

impl From<CaptureError> for ProctorError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::Detection(message) => ProctorError::DetectionFailure(message),
            slow @ CaptureError::DetectionTimeout(_) => {
                ProctorError::DetectionFailure(slow.to_string())
            }
            other => ProctorError::FrameSourceFailure(other.to_string()),
        }
    }
}

pub type ProctorResult<T> = std::result::Result<T, ProctorError>;

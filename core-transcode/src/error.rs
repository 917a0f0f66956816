use thiserror::Error;

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("Transcode failed: {message}")]
    Production { message: String },

    #[error("Invalid transcode status: {0}")]
    InvalidStatus(String),

    #[error("Invalid job ID: {0}")]
    InvalidJobId(String),

    #[error("Invalid resolution: {0}")]
    InvalidResolution(String),

    #[error("Invalid container format: {0}")]
    InvalidFormat(String),

    #[error("Invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Coordinator is shutting down")]
    Shutdown,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, TranscodeError>;

use thiserror::Error;

/// Errors that can occur in the detector
#[derive(Error, Debug)]
pub enum WhisperError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Core topology error: {0}")]
    Topology(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Buffer allocation error: {0}")]
    Allocation(String),

    #[error("Centers file error: {0}")]
    Centers(String),

    #[error("Learner error: {0}")]
    Learner(String),
}

pub type Result<T> = std::result::Result<T, WhisperError>;

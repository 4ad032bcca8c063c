//! Unified error handling

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SmolituxError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("audio error: {0}")]
    Audio(String),

    #[error("recognition error: {0}")]
    Recognition(String),

    #[error("model load error: {0}")]
    ModelLoad(String),

    #[error("speech synthesis error: {0}")]
    Synthesis(String),

    #[error("not supported on this platform: {0}")]
    Unsupported(String),

    #[error("voice control manager has been cleaned up")]
    Disposed,
}

pub type Result<T> = std::result::Result<T, SmolituxError>;

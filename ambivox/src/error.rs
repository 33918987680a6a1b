//! Error types for Ambivox

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AmbivoxError {
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio format error: {0}")]
    AudioFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audio loading error: {0}")]
    AudioLoading(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Unsupported by backend: {0}")]
    Unsupported(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Sound set error: {0}")]
    SoundSet(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AmbivoxError>;

//! Error types for Radiomark Core

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Engine error types.
///
/// Only caller contract violations and I/O surface here. A clip that simply
/// fails to match is reported through [`crate::MatchResult`], never as an error.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid sample rate: {0} Hz")]
    InvalidSampleRate(u32),

    // Signal processing errors
    #[error("Spectral transform failed: {0}")]
    Transform(String),

    // Persistence errors
    #[error("Malformed index snapshot: {0}")]
    Snapshot(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::InvalidConfig(msg.into())
    }

    /// Returns true if the error was caused by the caller's input rather than
    /// by the environment
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Error::InvalidConfig(_) | Error::InvalidSampleRate(_))
    }

    /// Returns the error code for logs and CLI output
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::InvalidSampleRate(_) => "INVALID_SAMPLE_RATE",
            Error::Transform(_) => "TRANSFORM",
            Error::Snapshot(_) => "SNAPSHOT",
            Error::Serialization(_) => "SERIALIZATION",
            Error::Io(_) => "IO",
        }
    }
}

impl From<realfft::FftError> for Error {
    fn from(err: realfft::FftError) -> Self {
        Error::Transform(err.to_string())
    }
}

//! # Error Handling
//!
//! Unified error type for NubDB operations. Corruption errors are fatal at
//! startup; everything else is reported to the caller and the store keeps
//! serving.

use thiserror::Error;

/// Result type alias for NubDB operations
pub type Result<T> = std::result::Result<T, Error>;

/// Primary error type for NubDB
#[derive(Error, Debug)]
pub enum Error {
    #[error("AOF error: {message}")]
    Aof {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("log corruption detected: {details}")]
    Corruption { details: String },

    #[error("compaction failed: {reason}")]
    Compaction { reason: String },

    #[error("invalid input: {message}")]
    Input { message: String },

    #[error("IO error: {message}")]
    Io {
        message: String,
        source: std::io::Error,
    },

    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl Error {
    /// Errors that must abort startup rather than be reported to a client.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Corruption { .. })
    }

    /// Get error code for monitoring
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Aof { .. } => "AOF_ERROR",
            Error::Corruption { .. } => "LOG_CORRUPTION",
            Error::Compaction { .. } => "COMPACTION_ERROR",
            Error::Input { .. } => "INVALID_INPUT",
            Error::Io { .. } => "IO_ERROR",
            Error::Configuration { .. } => "CONFIG_ERROR",
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io {
            message: err.to_string(),
            source: err,
        }
    }
}

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// Custom error types for the photo-organiser library
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Report or configuration (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A single file could not be read, decoded or hashed
    #[error("Unreadable file {}: {reason}", path.display())]
    UnreadableFile { path: PathBuf, reason: String },

    /// Labels could not be written into a copy's embedded metadata
    #[error("Metadata write failed for {}: {reason}", path.display())]
    Metadata { path: PathBuf, reason: String },

    /// Filesystem failure tied to a specific path
    #[error("Filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File not found error
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Invalid configuration error
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Safety check failure
    #[error("Safety check failed: {0}")]
    SafetyCheck(String),

    /// The run was cancelled through its cancellation token
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Build an `UnreadableFile` error from any displayable cause
    pub fn unreadable(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Error::UnreadableFile {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Build a `Metadata` error from any displayable cause
    pub fn metadata(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Error::Metadata {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Attach a path to an I/O error
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Filesystem {
            path: path.into(),
            source,
        }
    }
}

//! Error types for the wga-rs library.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for alignment runs.
pub type Result<T> = std::result::Result<T, WgaError>;

/// Errors that can abort an alignment run.
///
/// Every variant is fatal: a run either completes fully or fails with one of
/// these, leaving its scratch directory in place for inspection.
#[derive(Error, Debug)]
pub enum WgaError {
    /// Bad reference counts or missing required parameters
    #[error("Validation error: {0}")]
    Validation(String),

    /// Object store read failed or returned a malformed object
    #[error("Failed to fetch {reference}: {message}")]
    Fetch { reference: String, message: String },

    /// The alignment tool exited with a non-zero status
    #[error("Error running {tool}, return code: {exit_code}\n\n{output}")]
    ToolExecution {
        tool: String,
        exit_code: i32,
        output: String,
    },

    /// The alignment tool did not finish within the configured limit
    #[error("{tool} did not finish within {seconds} seconds")]
    Timeout { tool: String, seconds: u64 },

    /// The run was cancelled while the alignment tool was running
    #[error("Alignment run was cancelled")]
    Cancelled,

    /// Alignment binary could not be located
    #[error("{0} binary not found. Install it or ensure it is in PATH.")]
    BinaryNotFound(String),

    /// Tool output could not be turned into an alignment
    #[error("Failed to parse {format} output: {message}")]
    Parse { format: String, message: String },

    /// Object store write failed
    #[error("Failed to save {name}: {message}")]
    Persist { name: String, message: String },

    /// Expected file is missing
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// I/O error during file operations
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl WgaError {
    pub(crate) fn fetch(reference: impl Into<String>, message: impl Into<String>) -> Self {
        WgaError::Fetch {
            reference: reference.into(),
            message: message.into(),
        }
    }

    pub(crate) fn persist(name: impl Into<String>, message: impl Into<String>) -> Self {
        WgaError::Persist {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl From<tempfile::PersistError> for WgaError {
    fn from(e: tempfile::PersistError) -> Self {
        WgaError::IoError(e.error)
    }
}

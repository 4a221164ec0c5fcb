//! Error handling for RADOLAN ingestion operations.
//!
//! Every variant that concerns a file carries its path together with the
//! structural expectation that was violated, so batch reports can be shown
//! to the user without additional context.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RadolanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to extract {archive}: {reason} (missing members: {missing_members:?})")]
    Extraction {
        archive: PathBuf,
        missing_members: Vec<String>,
        reason: String,
    },

    #[error("Invalid composite format in file: {path} - {reason}")]
    Format { path: PathBuf, reason: String },

    #[error("Payload length mismatch in file: {path} - expected {expected} bytes, found {actual}")]
    PayloadLength {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },

    #[error("Unsupported product code '{product_code}' in file: {path}")]
    UnsupportedFormat { path: PathBuf, product_code: String },

    #[error(
        "Dimension mismatch at stack member {member_index}: expected {expected:?}, found {actual:?}"
    )]
    DimensionMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
        member_index: usize,
    },

    #[error("Geospatial capability '{capability}' is not available in this runtime")]
    DependencyUnavailable { capability: String },

    #[error("Invalid CRS definition '{crs}': {reason}")]
    InvalidCrs { crs: String, reason: String },

    #[error("Projection failed: {reason}")]
    Projection { reason: String },

    #[error("Selection position {position} is out of range for {available} members")]
    SelectionOutOfRange { position: usize, available: usize },

    #[error("Cannot assemble a stack from zero layers")]
    EmptyStack,

    #[error("File kind {kind} is not handled by the binary grid pipeline: {path}")]
    UnsupportedFileKind { path: PathBuf, kind: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Processing cancelled before {path} was started")]
    Cancelled { path: PathBuf },

    #[error("Worker task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

impl RadolanError {
    /// Create a format error for the given file
    pub fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an extraction error for an archive
    pub fn extraction(
        archive: impl Into<PathBuf>,
        missing_members: Vec<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Extraction {
            archive: archive.into(),
            missing_members,
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Header and payload-length violations are both format errors
    pub fn is_format_error(&self) -> bool {
        matches!(self, Self::Format { .. } | Self::PayloadLength { .. })
    }
}

pub type Result<T> = std::result::Result<T, RadolanError>;

//! Error types for xnat-sync

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, CommonError>;

/// Main error type for the shared library
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{path}: not a DICOM file")]
    NotDicom { path: String },

    #[error("DICOM error in {path}: {message}")]
    Dicom { path: String, message: String },

    #[error("Unknown DICOM attribute: {0}")]
    UnknownAttribute(String),

    #[error("Invalid value representation: {0}")]
    InvalidVr(String),

    #[error("Credentials error: {0}")]
    Credentials(String),
}

impl CommonError {
    pub(crate) fn dicom(path: &std::path::Path, message: impl std::fmt::Display) -> Self {
        Self::Dicom {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }
}

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for kubaru
#[derive(Error, Debug)]
pub enum KubaruError {
    #[error("{0}")]
    Validation(String),

    #[error(
        "TLS certificate not found ({cert} / {key}). Please run `kubaru gen-cert` first."
    )]
    CertificateMissing { cert: PathBuf, key: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to walk media directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Path escapes the media root: {0}")]
    PathEscape(PathBuf),

    #[error("Certificate generation failed: {0}")]
    Certificate(#[from] rcgen::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl KubaruError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        KubaruError::Validation(msg.into())
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, KubaruError>;

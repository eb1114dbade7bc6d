//! Error taxonomy shared by the sync engine, catalog and playback code.
//!
//! Only [`RadioError::Config`] is fatal, and only at startup. Everything else
//! is absorbed by the periodic driver, logged, and retried on the next cycle.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RadioError {
    /// Missing or malformed configuration / credentials.
    #[error("configuration error: {0}")]
    Config(String),

    /// Remote catalog unreachable, auth rejected, or a non-200 response.
    #[error("network error: {0}")]
    Network(String),

    /// Local bytes disagree with the manifest digest. Means "download again".
    #[error("integrity mismatch for {path}: expected {expected}, found {actual}")]
    IntegrityMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// An audio asset expected on disk is not there.
    #[error("asset missing: {}", .0.display())]
    AssetMissing(PathBuf),

    /// A manifest path or payload that does not follow the expected shape.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for RadioError {
    fn from(e: reqwest::Error) -> Self {
        RadioError::Network(e.to_string())
    }
}

impl RadioError {
    /// True for errors the driver loop should log and move past.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, RadioError::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, RadioError>;

//! Error types for romfetch
//!
//! Errors fall into two groups:
//! - Request errors (missing source, missing container file) are returned
//!   synchronously from [`DownloadManager::add_job`](crate::DownloadManager::add_job)
//! - Transfer errors never reach the caller; they end up as a job status and
//!   message visible through [`DownloadManager::list_jobs`](crate::DownloadManager::list_jobs)

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for romfetch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for romfetch
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "jobs_file")
        key: Option<String>,
    },

    /// The request cannot be served as given (e.g. neither a container nor a URL)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The container file a job refers to is not on disk
    #[error(
        "missing container file: {}; fetch metadata for this provider first",
        path.display()
    )]
    ContainerMissing {
        /// Path where the container was expected
        path: PathBuf,
    },

    /// The container file could not be parsed
    #[error("invalid container metainfo: {0}")]
    Metainfo(String),

    /// The archive engine failed to open or report on a container
    #[error("archive engine error: {0}")]
    Engine(String),

    /// Job not found
    #[error("job not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// Downloaded content does not match the checksum hint
    #[error("checksum mismatch for {name}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Artifact name
        name: String,
        /// Digest supplied with the request
        expected: String,
        /// Digest of the bytes written
        actual: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed URL
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Machine-readable error code, stable across releases
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::InvalidRequest(_) => "invalid_request",
            Error::ContainerMissing { .. } => "container_missing",
            Error::Metainfo(_) => "invalid_metainfo",
            Error::Engine(_) => "engine_error",
            Error::NotFound(_) => "not_found",
            Error::ShuttingDown => "shutting_down",
            Error::ChecksumMismatch { .. } => "checksum_mismatch",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Url(_) => "invalid_url",
            Error::Other(_) => "internal_error",
        }
    }

    /// Whether the caller can fix this error by supplying a different request
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidRequest(_) | Error::ContainerMissing { .. } | Error::Url(_)
        )
    }
}

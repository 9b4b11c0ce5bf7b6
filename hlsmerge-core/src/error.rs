//! Error types for the aggregation core
//!
//! Fetch and parse failures are per-source and never escape a poll cycle;
//! they exist so the engine can log why a source was dropped. "Not found"
//! lookups are modelled as `Option`, not as errors.

use thiserror::Error;

/// Maximum playlist body size accepted from an origin (16 MB).
pub const MAX_PLAYLIST_SIZE: u64 = 16 * 1024 * 1024;

/// Transport-level failure for a single playlist fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error {status} for {url}")]
    Status { status: reqwest::StatusCode, url: String },

    #[error("Empty body from {0}")]
    EmptyBody(String),

    #[error("Response too large ({size} bytes, max {MAX_PLAYLIST_SIZE})")]
    TooLarge { size: u64 },

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

/// Playlist body could not be turned into a document.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Empty playlist body")]
    Empty,

    #[error("Playlist is not valid UTF-8")]
    InvalidUtf8,

    #[error("Malformed playlist: {0}")]
    Malformed(String),

    #[error("Invalid playlist address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Expected {expected}, got {found}")]
    UnexpectedDocument {
        expected: &'static str,
        found: &'static str,
    },
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

pub type Result<T> = std::result::Result<T, Error>;

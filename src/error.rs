//! Error handling for the pi-control server.

use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum OurError {
    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Outbound HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Capture tool or camera device missing
    #[error("Camera unavailable: {0}")]
    Unavailable(String),

    /// Camera hardware already engaged by the other capture mode
    #[error("Camera busy: {0}")]
    Busy(String),

    /// A one-shot capture exceeded its time budget
    #[error("Capture timed out after {0} seconds")]
    Timeout(u64),

    /// A capture process ran but failed to produce a usable image
    #[error("Capture failed: {0}")]
    Capture(String),

    /// A request the client sent that could not be understood
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Unknown still identifier or missing artifact
    #[error("Not found: {0}")]
    NotFound(String),

    /// Generic application errors
    #[error("Application error: {0}")]
    App(String),
}

/// Application result type
pub type OurResult<T> = std::result::Result<T, OurError>;

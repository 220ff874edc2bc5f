// src/error.rs

//! Unified error handling for the portal scraper.

use std::fmt;

use thiserror::Error;

/// Result type alias for portal operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Login marker or login redirect detected
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Required page could not be fetched
    #[error("Fetch error for {context}: {message}")]
    Fetch { context: String, message: String },

    /// A single unit of work exceeded its deadline
    #[error("Timed out after {secs}s: {context}")]
    Timeout { context: String, secs: u64 },

    /// A page lacked structure the operation cannot proceed without
    #[error("Missing page structure: {0}")]
    MissingStructure(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create an authentication error.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// Create a fetch error with context.
    pub fn fetch(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(context: impl Into<String>, secs: u64) -> Self {
        Self::Timeout {
            context: context.into(),
            secs,
        }
    }

    /// Create a missing-structure error.
    pub fn missing(what: impl Into<String>) -> Self {
        Self::MissingStructure(what.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// True for failures the caller should report as bad credentials.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_kind() {
        assert!(AppError::auth("login page").is_auth_failure());
        assert!(!AppError::fetch("schedule", "503").is_auth_failure());
    }

    #[test]
    fn test_display() {
        let err = AppError::timeout("course content", 20);
        assert_eq!(err.to_string(), "Timed out after 20s: course content");
    }
}

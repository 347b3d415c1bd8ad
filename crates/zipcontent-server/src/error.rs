//! Error types for the zipcontent server.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Server startup and configuration errors.
///
/// Request-level failures are [`zipcontent_core::ContentError`]s and never
/// reach this type.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Error message.
        message: String,
    },

    /// The listener could not be bound.
    #[error("Bind error: {message}")]
    Bind {
        /// Error message.
        message: String,
    },

    /// The tracing subscriber could not be installed.
    #[error("Logging error: {message}")]
    Logging {
        /// Error message.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a bind error.
    pub fn bind(message: impl Into<String>) -> Self {
        Self::Bind {
            message: message.into(),
        }
    }

    /// Create a logging error.
    pub fn logging(message: impl Into<String>) -> Self {
        Self::Logging {
            message: message.into(),
        }
    }

    /// Get the error category.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Bind { .. } => "bind",
            Self::Logging { .. } => "logging",
            Self::Io(_) => "io",
        }
    }
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// JSON body of error responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code/category.
    pub error: String,
    /// Human-readable message.
    pub message: String,
    /// Request ID for correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            request_id: None,
        }
    }

    /// Set the request ID.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.error, self.message)
    }
}

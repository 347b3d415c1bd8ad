//! Error types for archive and download serving.

use http::StatusCode;
use thiserror::Error;

/// Errors raised while resolving or serving content.
///
/// Only the three `*NotFound` variants are distinguished for clients; every
/// other failure is reported as a generic server error.
#[derive(Debug, Error)]
pub enum ContentError {
    /// The archive file does not exist in local storage.
    #[error("\"{filename}\" does not exist locally")]
    ArchiveNotFound {
        /// Archive filename as requested.
        filename: String,
    },

    /// The archive exists but has no entry with the requested name.
    #[error("\"{member}\" does not exist inside \"{archive}\"")]
    MemberNotFound {
        /// Normalized member path that was looked up.
        member: String,
        /// Archive filename the lookup ran against.
        archive: String,
    },

    /// A standalone download target does not exist in local storage.
    #[error("\"{filename}\" does not exist locally")]
    FileNotFound {
        /// Filename as requested.
        filename: String,
    },

    /// The archive could not be read as a zip container.
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Response construction failed.
    #[error("HTTP error: {0}")]
    Http(#[from] http::Error),

    /// A blocking task panicked or was cancelled.
    #[error("Task error: {0}")]
    Task(String),
}

impl ContentError {
    /// Create an archive-not-found error.
    pub fn archive_not_found(filename: impl Into<String>) -> Self {
        Self::ArchiveNotFound {
            filename: filename.into(),
        }
    }

    /// Create a member-not-found error.
    pub fn member_not_found(member: impl Into<String>, archive: impl Into<String>) -> Self {
        Self::MemberNotFound {
            member: member.into(),
            archive: archive.into(),
        }
    }

    /// Create a file-not-found error.
    pub fn file_not_found(filename: impl Into<String>) -> Self {
        Self::FileNotFound {
            filename: filename.into(),
        }
    }

    /// Returns `true` for the variants that surface as 404.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ArchiveNotFound { .. } | Self::MemberNotFound { .. } | Self::FileNotFound { .. }
        )
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        if self.is_not_found() {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    /// Get the error category for logs.
    pub fn category(&self) -> &'static str {
        match self {
            Self::ArchiveNotFound { .. } => "archive_not_found",
            Self::MemberNotFound { .. } => "member_not_found",
            Self::FileNotFound { .. } => "file_not_found",
            Self::Archive(_) => "archive",
            Self::Io(_) => "io",
            Self::Http(_) => "http",
            Self::Task(_) => "task",
        }
    }
}

impl From<tokio::task::JoinError> for ContentError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

/// Result type for content operations.
pub type ContentResult<T> = Result<T, ContentError>;

//! Error types for ragcite

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using RagError
pub type Result<T> = std::result::Result<T, RagError>;

/// Error type alias for convenience
pub type Error = RagError;

/// Exit codes for CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const NOT_FOUND: i32 = 2;
    pub const INVALID_INPUT: i32 = 3;
    pub const REGRESSION: i32 = 4;
}

/// Main error type for ragcite
#[derive(Debug, Error)]
pub enum RagError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid fusion weights: vector={vector}, keyword={keyword} (must be in [0, 1] and sum to 1.0)")]
    InvalidWeights { vector: f64, keyword: f64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("All {attempts} attempts failed, last error: {last}")]
    AllRetriesFailed { attempts: u32, last: ProviderError },

    #[error("Index not found at {0} (ingest documents first)")]
    IndexMissing(PathBuf),

    #[error("Index at {path} failed validation: {reason}")]
    IndexCorrupt { path: PathBuf, reason: String },

    #[error("Evaluation aborted on query '{query_id}': {message}")]
    Evaluation { query_id: String, message: String },

    #[error("Search error: {0}")]
    Search(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl RagError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::DocumentNotFound(_) | Self::SessionNotFound(_) | Self::IndexMissing(_) => {
                exit_codes::NOT_FOUND
            }
            Self::InvalidConfig(_) | Self::InvalidWeights { .. } | Self::InvalidInput(_) => {
                exit_codes::INVALID_INPUT
            }
            _ => exit_codes::GENERAL_ERROR,
        }
    }

    /// Whether a retry of the failed operation could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Classification of failures coming back from an external provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    Timeout,
    RateLimited,
    Connection,
    ServerError,
    Auth,
    BadRequest,
    InvalidResponse,
}

impl ProviderErrorKind {
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::RateLimited | Self::Connection | Self::ServerError
        )
    }

    /// Map an HTTP status code to a failure kind
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Auth,
            408 => Self::Timeout,
            429 => Self::RateLimited,
            500..=599 => Self::ServerError,
            _ => Self::BadRequest,
        }
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::RateLimited => "rate limited",
            Self::Connection => "connection error",
            Self::ServerError => "server error",
            Self::Auth => "authentication failed",
            Self::BadRequest => "bad request",
            Self::InvalidResponse => "invalid response",
        };
        f.write_str(s)
    }
}

/// Error returned by an embedding or LLM provider
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Timeout, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::InvalidResponse, message)
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            ProviderErrorKind::Timeout
        } else if e.is_connect() || e.is_request() {
            ProviderErrorKind::Connection
        } else if let Some(status) = e.status() {
            ProviderErrorKind::from_status(status.as_u16())
        } else if e.is_decode() || e.is_body() {
            ProviderErrorKind::InvalidResponse
        } else if e.is_builder() {
            ProviderErrorKind::BadRequest
        } else {
            ProviderErrorKind::Connection
        };
        Self::new(kind, e.to_string())
    }
}

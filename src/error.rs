//! Unified error handling for the pocrunner crate
//!
//! Failures inside a single task or probe are never surfaced through this
//! type; they are folded into liveness classification or left to the check
//! executor. What remains here are setup failures (configuration, catalog
//! loading, HTTP client construction) that abort a scan before dispatch.
//!
//! # Usage
//!
//! ```rust,ignore
//! use pocrunner::error::{Error, ErrorCategory};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         println!("Retrying: {err}");
//!     } else {
//!         eprintln!("Fatal error: {err}");
//!     }
//! }
//! ```

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-related errors (HTTP client, proxy)
    Network,
    /// Configuration and validation errors
    Config,
    /// Target list and PoC catalog errors
    Catalog,
    /// File system errors
    Storage,
    /// Dispatch engine errors
    Dispatch,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Config => "config",
            Self::Catalog => "catalog",
            Self::Storage => "storage",
            Self::Dispatch => "dispatch",
            Self::Other => "other",
        }
    }
}

/// Unified error type for the pocrunner crate
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Target could not be parsed into something probeable
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// PoC definition could not be loaded
    #[error("Invalid PoC {path}: {reason}")]
    Poc { path: PathBuf, reason: String },

    /// Dispatch engine could not be started
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a PoC loading error
    pub fn poc(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Poc {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Check if this error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io(_) => true, // I/O errors are often transient
            Self::Http(_) => true,
            Self::Config(_)
            | Self::InvalidTarget(_)
            | Self::Poc { .. }
            | Self::Dispatch(_)
            | Self::Toml(_)
            | Self::Json(_)
            | Self::Other { .. } => false,
        }
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Http(_) => ErrorCategory::Network,
            Self::Config(_) | Self::Toml(_) => ErrorCategory::Config,
            Self::InvalidTarget(_) | Self::Poc { .. } => ErrorCategory::Catalog,
            Self::Io(_) | Self::Json(_) => ErrorCategory::Storage,
            Self::Dispatch(_) => ErrorCategory::Dispatch,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

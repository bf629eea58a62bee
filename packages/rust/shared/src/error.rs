//! Error types for hottake.
//!
//! Library crates use [`HotTakeError`] via `thiserror`.
//! App crates (cli) wrap this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level error type for all hottake operations.
#[derive(Debug, thiserror::Error)]
pub enum HotTakeError {
    /// An upstream call exceeded its deadline.
    #[error("{operation} timed out after {}s", after.as_secs())]
    TransportTimeout {
        operation: String,
        after: Duration,
    },

    /// Non-timeout network or HTTP error while fetching a page.
    #[error("fetch failed: {0}")]
    FetchFailure(String),

    /// A completion answer could not be parsed as the expected JSON.
    #[error("malformed provider output: {message}")]
    MalformedProviderOutput { message: String },

    /// A completion or search call failed.
    #[error("upstream failure: {0}")]
    UpstreamFailure(String),

    /// The stream decoder could not resolve a value boundary.
    #[error("framing error: {message}")]
    Framing { message: String },

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Request or data validation error.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The consumer of a run's event stream went away.
    #[error("run cancelled: event consumer disconnected")]
    Cancelled,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, HotTakeError>;

/// Wire-level classification of a failure, carried by error events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TransportTimeout,
    FetchFailure,
    MalformedProviderOutput,
    UpstreamFailure,
    Framing,
    Config,
    Validation,
    Io,
    Cancelled,
}

impl HotTakeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a malformed-output error from any displayable message.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedProviderOutput {
            message: msg.into(),
        }
    }

    /// Create a framing error from any displayable message.
    pub fn framing(msg: impl Into<String>) -> Self {
        Self::Framing {
            message: msg.into(),
        }
    }

    /// Create a timeout error for the named operation.
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::TransportTimeout {
            operation: operation.into(),
            after,
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Classify this error for the wire.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TransportTimeout { .. } => ErrorKind::TransportTimeout,
            Self::FetchFailure(_) => ErrorKind::FetchFailure,
            Self::MalformedProviderOutput { .. } => ErrorKind::MalformedProviderOutput,
            Self::UpstreamFailure(_) => ErrorKind::UpstreamFailure,
            Self::Framing { .. } => ErrorKind::Framing,
            Self::Config { .. } => ErrorKind::Config,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Io { .. } => ErrorKind::Io,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

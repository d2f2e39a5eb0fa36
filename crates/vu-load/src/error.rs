//! Error types for the virtual-user load harness.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using HarnessError.
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Fatal errors that abort a test run.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    DataLoad(#[from] DataLoadError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Record index {index} out of range for dataset of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// The HTTP client could not be constructed. Fatal before any VU starts.
    #[error("Failed to build HTTP client: {0}")]
    ClientSetup(#[source] reqwest::Error),

    /// A VU task died instead of reaching `Stopped`.
    #[error("Virtual user {vu_id} aborted: {message}")]
    VuAborted { vu_id: usize, message: String },
}

/// The dataset could not be turned into at least one record.
#[derive(Debug, Error)]
pub enum DataLoadError {
    #[error("Failed to read dataset '{source_name}': {error}")]
    Read {
        source_name: String,
        #[source]
        error: std::io::Error,
    },

    #[error("Failed to parse dataset '{source_name}': {error}")]
    Parse {
        source_name: String,
        #[source]
        error: csv::Error,
    },

    #[error("Dataset '{source_name}' contains no records")]
    Empty { source_name: String },
}

/// Invalid or unreadable test configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("vus must be >= 1, got {0}")]
    InvalidVus(u32),

    #[error("duration must be > 0 seconds, got {0}")]
    InvalidDuration(f64),

    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Failed to read scenario {path}: {error}")]
    Read {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("Failed to parse scenario {path}: {error}")]
    Parse {
        path: PathBuf,
        #[source]
        error: serde_yaml::Error,
    },
}

impl ConfigError {
    pub fn invalid(param: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            param: param.into(),
            message: message.into(),
        }
    }
}

/// Transport-level failure of a single HTTP call.
///
/// Counted as a call failure, never as a check failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Request timeout")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request failed: {0}")]
    Request(String),
}

impl NetworkError {
    /// Short label used when logging and counting failures.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect(_) => "connect",
            Self::Request(_) => "request",
        }
    }
}

/// A check predicate could not be evaluated against a response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct CheckEvaluationError(pub String);

impl CheckEvaluationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

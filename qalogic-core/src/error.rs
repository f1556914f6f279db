//! Error types for the qalogic metrics core.
//!
//! Uses `thiserror` for structured error variants. Every failure in the
//! metrics core propagates to the caller; nothing is logged and dropped.

/// Top-level error type for the metrics core.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Empty population: no results to compute {what} over")]
    EmptyPopulation { what: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("Precondition violated: {message}")]
    PreconditionViolation { message: String },

    #[error(
        "Internal consistency error: total correct {actual} != robust correct + non-robust correct {expected}"
    )]
    InternalConsistency { expected: usize, actual: usize },

    #[error("Judge error: {0}")]
    Judge(#[from] JudgeError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MetricsError {
    pub fn empty(what: impl Into<String>) -> Self {
        Self::EmptyPopulation { what: what.into() }
    }

    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::PreconditionViolation {
            message: message.into(),
        }
    }
}

/// Errors raised by a judge while producing a verdict.
#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    #[error("Completion request failed: {message}")]
    Completion { message: String },

    #[error("Could not parse a verdict from judge output: {raw:?}")]
    UnparseableVerdict { raw: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration load failed: {0}")]
    Load(#[from] Box<figment::Error>),
}

/// A type alias for results using [`MetricsError`].
pub type Result<T> = std::result::Result<T, MetricsError>;

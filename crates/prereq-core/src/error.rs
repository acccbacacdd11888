//! Error types for prereq.
//!
//! Fatal startup failures (`DataLoadError`, `ModelInitError`) are kept apart
//! from recoverable ones so the CLI can decide what ends a session.
//! `ProviderError` lives here so the generator can downcast and classify
//! errors for retry decisions without string matching.

use std::path::PathBuf;

use thiserror::Error;

/// The question dataset could not be loaded.
#[derive(Debug, Error)]
pub enum DataLoadError {
    #[error("failed to read dataset {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed dataset {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("dataset {path} is missing required column '{column}'")]
    MissingColumn { path: PathBuf, column: &'static str },

    #[error("row {row} has an empty question_id")]
    EmptyId { row: usize },

    #[error("duplicate question_id '{0}'")]
    DuplicateId(String),
}

/// The similarity model could not be brought up at startup.
#[derive(Debug, Error)]
#[error("failed to initialize similarity model '{model}': {reason}")]
pub struct ModelInitError {
    pub model: String,
    pub reason: String,
}

/// A single similarity computation failed. Never leaves the scorer.
#[derive(Debug, Error)]
pub enum ScoreComputationError {
    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("embedding dimensions differ ({left} vs {right})")]
    DimensionMismatch { left: usize, right: usize },

    #[error("embedding contains non-finite values")]
    NonFinite,
}

/// Reading or appending to a progress ledger failed.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed ledger {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("invalid annotator name '{0}': use a non-empty name without spaces or path separators")]
    InvalidIdentity(String),
}

/// Contract violations of the session controller.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("question '{0}' has already been annotated")]
    AlreadyCompleted(String),

    #[error("question '{0}' is not in the dataset")]
    UnknownQuestion(String),

    #[error("'{prerequisite}' is not a candidate prerequisite of question '{question_id}'")]
    UnknownPrerequisite {
        question_id: String,
        prerequisite: String,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Merging annotator ledgers failed.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("no ledger files matching '{0}'")]
    NoLedgers(String),

    #[error("invalid ledger pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("refusing to overwrite annotator ledger {0}; choose another output path")]
    OutputIsLedger(PathBuf),

    #[error("{path} is not a ledger: unexpected header '{found}'")]
    HeaderMismatch { path: PathBuf, found: String },

    #[error("merge I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed ledger {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Errors that can occur when interacting with an LLM or embedding provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),
}

impl ProviderError {
    /// Returns `true` if this error is permanent and should not be retried.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ProviderError::AuthenticationFailed(_) | ProviderError::ModelNotFound(_)
        )
    }

    /// Returns the retry-after delay in milliseconds, if applicable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

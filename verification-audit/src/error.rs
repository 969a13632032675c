//! Error types for verification audit

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Collaborator an audit pass reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Billed-service records
    Billing,
    /// Biometric capture events
    Verification,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Billing => write!(f, "billing"),
            DataSource::Verification => write!(f, "verification"),
        }
    }
}

/// Verification audit error
#[derive(Debug, Error)]
pub enum Error {
    /// A collaborator could not be queried; no reconciliation was attempted
    #[error("{store} source unavailable: {reason}")]
    SourceUnavailable {
        /// Which store failed
        store: DataSource,
        /// Underlying failure
        reason: String,
    },

    /// Tolerance window is negative or not a number
    #[error("Invalid tolerance: {0}")]
    InvalidTolerance(String),

    /// Audit filter is inconsistent (e.g. inverted date range)
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Event violates a data model invariant
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// CSV export failed
    #[error("Export error: {0}")]
    Export(String),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a failed collaborator fetch
    pub fn source_unavailable(store: DataSource, reason: impl Into<String>) -> Self {
        Error::SourceUnavailable {
            store,
            reason: reason.into(),
        }
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::Export(err.to_string())
    }
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

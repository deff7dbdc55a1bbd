//! Error types for archive-dl
//!
//! This module provides the error handling for the library:
//! - A top-level [`Error`] covering configuration, transport, and I/O faults
//! - Domain-specific nested errors ([`LedgerError`], [`DatasetError`])
//!
//! Per-batch fetch failures are deliberately *not* represented here: they are
//! converted to [`TaskOutcome::Failure`](crate::types::TaskOutcome) data at the
//! worker boundary and recorded in the failure ledger, never propagated as
//! errors.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::ImageId;

/// Result type alias for archive-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for archive-dl
///
/// Every variant here is fatal for the run that raised it. Recoverable
/// per-batch failures travel through the outcome stream instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "fetch.batch_size")
        key: Option<String>,
    },

    /// Remote API error (authentication failure, non-2xx response)
    #[error("archive API error: {0}")]
    Api(String),

    /// Failure ledger could not be read or written
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Dataset store error (missing base, reconcile persistence)
    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),

    /// Archive extraction error
    #[error("extraction failed for {archive}: {reason}")]
    Extraction {
        /// The archive file that failed to extract
        archive: PathBuf,
        /// The reason extraction failed
        reason: String,
    },

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

/// Failure-ledger errors
///
/// A ledger write failure when failed batches exist is a data-loss risk: the
/// error carries the units that could not be recorded so the caller can
/// surface them instead of silently dropping them.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Ledger file could not be written; the listed units were not recorded
    #[error("failed to persist ledger to {path} ({units} units lost): {reason}")]
    Persist {
        /// The ledger file path that could not be written
        path: PathBuf,
        /// Number of units that failed to be recorded
        units: usize,
        /// The underlying I/O failure
        reason: String,
        /// The work units that were lost
        lost: Vec<ImageId>,
    },

    /// No ledger file exists to load a retry run from
    #[error("no failure ledger found at {path}; nothing to retry")]
    NotFound {
        /// The expected ledger file path
        path: PathBuf,
    },

    /// Ledger file exists but does not contain a valid unit list
    #[error("ledger at {path} is corrupt: {reason}")]
    Corrupt {
        /// The ledger file path
        path: PathBuf,
        /// Why the contents could not be parsed
        reason: String,
    },
}

/// Dataset-store errors
#[derive(Debug, Error)]
pub enum DatasetError {
    /// Retry reconciliation requires a prior dataset, but none exists
    #[error("no base dataset at {path}; a retry run requires a prior successful run")]
    MissingBase {
        /// The expected dataset file path
        path: PathBuf,
    },

    /// The merged dataset could not be persisted; the original file is untouched
    #[error("failed to persist dataset to {path}: {reason}")]
    Persist {
        /// The dataset file path
        path: PathBuf,
        /// The underlying failure
        reason: String,
    },

    /// The dataset file exists but could not be parsed
    #[error("dataset at {path} is malformed: {reason}")]
    Malformed {
        /// The dataset file path
        path: PathBuf,
        /// The parse failure
        reason: String,
    },
}

//! Core types for archive-dl

use serde::{Deserialize, Serialize};

/// Unique identifier for one image in the remote archive
///
/// This is the smallest addressable unit of work: created when a run's unit
/// source is read, dispatched exactly once inside a [`Batch`], and recorded in
/// the failure ledger when its batch fails.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(pub String);

impl ImageId {
    /// Create a new ImageId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ImageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ImageId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ImageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An ordered, size-bounded group of [`ImageId`]s dispatched as one fetch call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Batch {
    /// Position of this batch in dispatch order (0-based)
    pub index: usize,
    /// The work units in this batch, in input order
    pub units: Vec<ImageId>,
}

impl Batch {
    /// Number of work units in this batch
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether the batch contains no work units
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// The result of one batch fetch, produced exactly once per dispatched batch
///
/// Fetch errors, timeouts and cancellation all collapse into `Failure`; the
/// engine treats every failure kind uniformly as "batch goes to the ledger".
#[derive(Debug)]
pub enum TaskOutcome<P> {
    /// The batch fetch returned a payload
    Success(P),
    /// The batch fetch failed; the reason is informational only
    Failure {
        /// Description of what went wrong (error text, "timed out", "cancelled")
        reason: String,
    },
}

impl<P> TaskOutcome<P> {
    /// Whether this outcome is a failure
    pub fn is_failure(&self) -> bool {
        matches!(self, TaskOutcome::Failure { .. })
    }
}

/// What a batch download request should include
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Include {
    /// Images and metadata
    All,
    /// Image files only
    #[default]
    Images,
    /// Metadata only
    Metadata,
}

impl Include {
    /// The lowercase query-parameter value the archive API expects
    pub fn as_query_value(&self) -> &'static str {
        match self {
            Include::All => "all",
            Include::Images => "images",
            Include::Metadata => "metadata",
        }
    }
}

/// One metadata record for a single archive image
///
/// Doubles as the JSON shape handed back by the fetcher and the CSV row shape
/// of the persisted dataset. `isic_id` is the record key: the dataset holds at
/// most one row per id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Stable archive identifier (the record key)
    pub isic_id: String,
    /// Human-readable image name
    #[serde(default)]
    pub name: Option<String>,
    /// Name of the dataset the image belongs to
    #[serde(default)]
    pub dataset: Option<String>,
    /// Clinical diagnosis
    #[serde(default)]
    pub diagnosis: Option<String>,
    /// Benign/malignant classification
    #[serde(default)]
    pub benign_malignant: Option<String>,
    /// Approximate patient age
    #[serde(default)]
    pub age_approx: Option<f64>,
    /// Patient sex
    #[serde(default)]
    pub sex: Option<String>,
}

impl MetadataRecord {
    /// The record key used for dataset deduplication
    pub fn key(&self) -> &str {
        &self.isic_id
    }
}

/// Progress and lifecycle events emitted during a run
///
/// Subscribe via [`ArchiveFetcher::subscribe`](crate::engine::ArchiveFetcher::subscribe).
/// `RunStarted` always precedes dispatch so a progress indicator can be
/// initialized with the total; exactly one `BatchFinished` follows per
/// attempted batch, success and failure alike.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A run is about to dispatch its batches
    RunStarted {
        /// Total number of batches the run will attempt
        total_batches: usize,
    },

    /// One batch finished (successfully or not)
    BatchFinished {
        /// The batch's dispatch index
        batch_index: usize,
        /// Number of work units in the batch
        units: usize,
        /// Whether the batch failed
        failed: bool,
    },

    /// The run finished and its report is final
    RunFinished {
        /// Summary of the run
        report: RunReport,
    },
}

/// Terminal status of a run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every batch succeeded; no residual ledger exists
    Complete,
    /// Some batches failed; the ledger was written and a retry run is available
    Partial,
}

/// Summary of one engine run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Number of batches dispatched
    pub total_batches: usize,
    /// Number of batches that succeeded
    pub succeeded_batches: usize,
    /// Number of batches that failed
    pub failed_batches: usize,
    /// Number of work units recorded in the failure ledger
    pub missing_units: usize,
    /// Terminal status
    pub status: RunStatus,
}

impl RunReport {
    /// Whether a retry run would have work to do
    pub fn retry_available(&self) -> bool {
        self.status == RunStatus::Partial
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            RunStatus::Complete => {
                write!(f, "{} batches fetched, no failures", self.total_batches)
            }
            RunStatus::Partial => write!(
                f,
                "{} of {} batches failed ({} records missing), retry available",
                self.failed_batches, self.total_batches, self.missing_units
            ),
        }
    }
}

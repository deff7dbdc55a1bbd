//! # archive-dl
//!
//! Batch download manager library for paginated image archive APIs.
//!
//! ## Design Philosophy
//!
//! archive-dl is designed to be:
//! - **Resilient** - per-batch failures are recorded, never fatal; a durable
//!   ledger scopes the next run to exactly the missing work
//! - **Bounded** - a fixed worker pool caps in-flight requests, with an
//!   optional cooldown between dispatch rounds for rate-limited APIs
//! - **Library-first** - no CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - consumers subscribe to progress events, no polling
//!
//! ## Quick Start
//!
//! ```no_run
//! use archive_dl::{ArchiveFetcher, Config, Include};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let fetcher = ArchiveFetcher::new(Config::default()).await?;
//!
//!     // Subscribe to progress events
//!     let mut events = fetcher.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     // Download every image of a dataset, 300 ids per batch
//!     let report = fetcher
//!         .download_images("HAM10000", Include::Images, false)
//!         .await?;
//!     println!("{report}");
//!
//!     if report.retry_available() {
//!         // A later run picks up exactly the failed batches
//!         fetcher.download_images("HAM10000", Include::Images, true).await?;
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Remote archive API client
pub mod client;
/// Configuration types
pub mod config;
/// Persisted dataset store and reconciliation
pub mod dataset;
/// Core batch-fetch engine
pub mod engine;
/// Error types
pub mod error;
/// Zip archive extraction
pub mod extraction;
/// Durable failure ledger
pub mod ledger;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use client::{ArchiveClient, ListQuery, RecordFetcher};
pub use config::{ApiConfig, Config, FetchConfig, StorageConfig};
pub use dataset::MetadataStore;
pub use engine::{ArchiveFetcher, partition};
pub use error::{DatasetError, Error, LedgerError, Result};
pub use extraction::{ExtractionSummary, ZipExtractor};
pub use ledger::FailureLedger;
pub use types::{
    Batch, Event, ImageId, Include, MetadataRecord, RunReport, RunStatus, TaskOutcome,
};

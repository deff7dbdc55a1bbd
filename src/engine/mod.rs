//! Concurrent batch-fetch-and-reconcile engine
//!
//! [`ArchiveFetcher`] is the crate's facade. One run flows through the
//! submodules in order:
//! - [`partition`] — split the unit source into fixed-size batches
//! - [`pool`] — dispatch batches across a bounded worker pool
//! - [`collector`] — gather per-batch outcomes as they complete
//!
//! then settles: failed batches go to the durable failure ledger and
//! successful metadata is reconciled into the dataset store. A run configured
//! as a retry replaces its unit source wholesale with the ledger's contents —
//! that substitution is the only retry scoping there is.

mod collector;
mod partition;
mod pool;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use partition::partition;

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::client::{ArchiveClient, ListQuery, RecordFetcher};
use crate::config::Config;
use crate::dataset::MetadataStore;
use crate::error::Result;
use crate::ledger::FailureLedger;
use crate::types::{
    Batch, Event, ImageId, Include, MetadataRecord, RunReport, RunStatus,
};

use collector::Collected;
use pool::PoolOptions;

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Batch download engine for a remote image archive
///
/// Construction validates the configuration; invalid batch sizes or worker
/// counts are rejected before any work starts. All state is scoped to this
/// value — nothing global is touched.
pub struct ArchiveFetcher {
    config: Config,
    fetcher: Arc<dyn RecordFetcher>,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
    ledger: FailureLedger,
    store: MetadataStore,
}

impl std::fmt::Debug for ArchiveFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveFetcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ArchiveFetcher {
    /// Create an engine backed by the production HTTP client
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let client = ArchiveClient::new(&config.api, config.fetch.request_timeout).await?;
        Self::with_fetcher(config, Arc::new(client))
    }

    /// Create an engine over a caller-supplied fetcher implementation
    pub fn with_fetcher(config: Config, fetcher: Arc<dyn RecordFetcher>) -> Result<Self> {
        config.validate()?;
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let ledger = FailureLedger::new(&config.storage.ledger_file);
        let store = MetadataStore::new(&config.storage.dataset_file);

        Ok(Self {
            config,
            fetcher,
            event_tx,
            cancel: CancellationToken::new(),
            ledger,
            store,
        })
    }

    /// Subscribe to run progress events
    ///
    /// `Event::RunStarted` always precedes dispatch and carries the total
    /// batch count, so a progress indicator can be initialized before the
    /// first completion arrives.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Stop dispatching further batches
    ///
    /// In-flight batches finish; not-yet-dispatched batches become failures
    /// and land in the ledger, recoverable by a later retry run.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The dataset store backing metadata reconciliation
    pub fn dataset_store(&self) -> &MetadataStore {
        &self.store
    }

    /// The failure ledger backing retry runs
    pub fn failure_ledger(&self) -> &FailureLedger {
        &self.ledger
    }

    /// Per-dataset row counts from the persisted dataset, most populous first
    pub fn available_datasets(&self) -> Result<Vec<(String, usize)>> {
        self.store.dataset_counts()
    }

    /// List image ids from the remote archive's paginated index
    pub async fn list_images(&self, query: &ListQuery) -> Result<Vec<ImageId>> {
        self.fetcher.list_image_ids(query).await
    }

    /// Download the image archives for every id of the named dataset
    ///
    /// Unit source: the persisted dataset's rows for `dataset` — or, when
    /// `retry` is set, the failure ledger of the previous run. Each batch is
    /// fetched as one zip payload and written as `download_{index}.zip` under
    /// the configured download directory.
    pub async fn download_images(
        &self,
        dataset: &str,
        include: Include,
        retry: bool,
    ) -> Result<RunReport> {
        let units = self.unit_source(retry, || self.store.image_ids(dataset))?;
        let batches = partition(units, self.config.fetch.batch_size)?;
        tokio::fs::create_dir_all(&self.config.storage.download_dir).await?;

        let fetcher = Arc::clone(&self.fetcher);
        let download_dir = self.config.storage.download_dir.clone();
        let collected = self
            .run_batched(batches, move |batch: Batch| {
                let fetcher = Arc::clone(&fetcher);
                let download_dir = download_dir.clone();
                async move {
                    let payload = fetcher.fetch_image_archive(&batch.units, include).await?;
                    let path = download_dir.join(format!("download_{}.zip", batch.index));
                    tokio::fs::write(&path, &payload).await?;
                    Ok(path)
                }
            })
            .await;

        self.settle(collected, |_successes| Ok(()))
    }

    /// Fetch metadata records for the given ids and reconcile them into the
    /// persisted dataset
    ///
    /// When `retry` is set, the unit source is the failure ledger instead of
    /// `ids`, and reconciliation appends only keys missing from the existing
    /// dataset (which must exist). A fresh run rebuilds the dataset from the
    /// fetched records, deduplicating first-seen-wins.
    pub async fn fetch_metadata(&self, ids: Vec<ImageId>, retry: bool) -> Result<RunReport> {
        let units = self.unit_source(retry, || Ok(ids))?;
        let batches = partition(units, self.config.fetch.batch_size)?;

        let fetcher = Arc::clone(&self.fetcher);
        let collected = self
            .run_batched(batches, move |batch: Batch| {
                let fetcher = Arc::clone(&fetcher);
                async move { fetcher.fetch_metadata(&batch.units).await }
            })
            .await;

        self.settle(collected, |successes| {
            // Dispatch order, not completion order, determines the incoming
            // record order the dedup policy sees
            let mut successes = successes;
            successes.sort_by_key(|(batch, _)| batch.index);
            let records: Vec<MetadataRecord> = successes
                .into_iter()
                .flat_map(|(_, records)| records)
                .collect();
            self.store.reconcile(records, retry)?;
            Ok(())
        })
    }

    /// Resolve the run's unit source: the primary source, or the ledger on retry
    fn unit_source(
        &self,
        retry: bool,
        primary: impl FnOnce() -> Result<Vec<ImageId>>,
    ) -> Result<Vec<ImageId>> {
        if retry {
            tracing::info!("retry run: unit source replaced by failure ledger");
            self.ledger.load()
        } else {
            primary()
        }
    }

    /// Announce the run, dispatch every batch, and drain the outcomes
    async fn run_batched<P, F, Fut>(&self, batches: Vec<Batch>, fetch: F) -> Collected<P>
    where
        P: Send + 'static,
        F: Fn(Batch) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<P>> + Send + 'static,
    {
        let total_batches = batches.len();
        tracing::info!(
            total_batches,
            workers = self.config.fetch.workers,
            batch_size = self.config.fetch.batch_size,
            "dispatching run"
        );
        self.event_tx
            .send(Event::RunStarted { total_batches })
            .ok();

        let outcomes = pool::run_batches(
            batches,
            fetch,
            PoolOptions {
                workers: self.config.fetch.workers,
                request_timeout: self.config.fetch.request_timeout,
                batch_delay: self.config.fetch.batch_delay,
                cancel: self.cancel.clone(),
            },
        );

        collector::drain(outcomes, &self.event_tx).await
    }

    /// Persist failures, run the success-persistence step, and report
    ///
    /// The ledger is written *before* successes are persisted: losing the
    /// record of what is missing is worse than re-fetching what succeeded.
    /// The ledger is only cleared once a fully successful run's output has
    /// been persisted.
    fn settle<P>(
        &self,
        collected: Collected<P>,
        persist_successes: impl FnOnce(Vec<(Batch, P)>) -> Result<()>,
    ) -> Result<RunReport> {
        let total_batches = collected.attempted();
        let Collected {
            successes,
            mut failures,
        } = collected;

        // Deterministic ledger contents: dispatch order, each unit exactly once
        failures.sort_by_key(|batch| batch.index);
        let missing: Vec<ImageId> = failures
            .iter()
            .flat_map(|batch| batch.units.iter().cloned())
            .collect();

        if !missing.is_empty() {
            self.ledger.persist(&missing)?;
        }

        let report = RunReport {
            total_batches,
            succeeded_batches: successes.len(),
            failed_batches: failures.len(),
            missing_units: missing.len(),
            status: if missing.is_empty() {
                RunStatus::Complete
            } else {
                RunStatus::Partial
            },
        };

        persist_successes(successes)?;

        if report.status == RunStatus::Complete {
            self.ledger.clear()?;
            tracing::info!(batches = report.total_batches, "run complete, no failures");
        } else {
            tracing::warn!(
                failed_batches = report.failed_batches,
                missing_units = report.missing_units,
                ledger = %self.ledger.path().display(),
                "run partially failed, retry available"
            );
        }

        self.event_tx
            .send(Event::RunFinished {
                report: report.clone(),
            })
            .ok();
        Ok(report)
    }
}

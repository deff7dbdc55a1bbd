//! Bounded worker pool — batch fan-out over a buffered stream
//!
//! Each batch is submitted exactly once; at most `workers` fetches are in
//! flight at any moment. Completion order is not guaranteed. A fetch error,
//! timeout, or cancellation is converted into a `Failure` outcome at the
//! worker boundary — it never crashes the pool or blocks other workers.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::types::{Batch, TaskOutcome};

/// Dispatch parameters for one pool run
pub(crate) struct PoolOptions {
    /// Maximum concurrent in-flight fetches
    pub(crate) workers: usize,
    /// Timeout applied to each individual fetch
    pub(crate) request_timeout: Duration,
    /// Optional cooldown between dispatch rounds
    ///
    /// When set, batches are grouped into rounds of `workers` and the
    /// cooldown sleeps between rounds — not between individual completions.
    pub(crate) batch_delay: Option<Duration>,
    /// Token checked before each fetch; cancelled batches become failures
    pub(crate) cancel: CancellationToken,
}

/// Run every batch through the fetch function with bounded concurrency
///
/// Returns a stream of `(Batch, TaskOutcome)` pairs in completion order. The
/// stream ends once every submitted batch has produced exactly one outcome;
/// with zero batches it ends immediately and no worker is spawned.
pub(crate) fn run_batches<P, F, Fut>(
    batches: Vec<Batch>,
    fetch: F,
    options: PoolOptions,
) -> ReceiverStream<(Batch, TaskOutcome<P>)>
where
    P: Send + 'static,
    F: Fn(Batch) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<P>> + Send + 'static,
{
    let (tx, rx) = tokio::sync::mpsc::channel(options.workers.max(1));

    tokio::spawn(async move {
        let fetch = Arc::new(fetch);
        match options.batch_delay {
            Some(delay) => {
                let rounds: Vec<Vec<Batch>> = batches
                    .chunks(options.workers.max(1))
                    .map(|round| round.to_vec())
                    .collect();
                let total_rounds = rounds.len();

                for (round_index, round) in rounds.into_iter().enumerate() {
                    if round_index > 0 {
                        tracing::debug!(
                            round = round_index + 1,
                            total_rounds,
                            cooldown_ms = delay.as_millis() as u64,
                            "cooling down before next dispatch round"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    dispatch(round, Arc::clone(&fetch), &options, &tx).await;
                }
            }
            None => dispatch(batches, Arc::clone(&fetch), &options, &tx).await,
        }
    });

    ReceiverStream::new(rx)
}

/// Fan one group of batches out across the worker slots
async fn dispatch<P, F, Fut>(
    batches: Vec<Batch>,
    fetch: Arc<F>,
    options: &PoolOptions,
    tx: &tokio::sync::mpsc::Sender<(Batch, TaskOutcome<P>)>,
) where
    P: Send + 'static,
    F: Fn(Batch) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<P>> + Send + 'static,
{
    stream::iter(batches)
        .map(|batch| {
            let fetch = Arc::clone(&fetch);
            let cancel = options.cancel.clone();
            let timeout = options.request_timeout;
            async move { fetch_one(batch, fetch, timeout, cancel).await }
        })
        .buffer_unordered(options.workers.max(1))
        .for_each(|outcome| async {
            // A dropped receiver means the run was abandoned; outcomes can
            // only be discarded at that point
            let _ = tx.send(outcome).await;
        })
        .await;
}

/// Execute a single batch fetch, converting every failure mode into data
async fn fetch_one<P, F, Fut>(
    batch: Batch,
    fetch: Arc<F>,
    timeout: Duration,
    cancel: CancellationToken,
) -> (Batch, TaskOutcome<P>)
where
    F: Fn(Batch) -> Fut,
    Fut: Future<Output = Result<P>>,
{
    if cancel.is_cancelled() {
        tracing::debug!(batch = batch.index, "run cancelled, batch not fetched");
        return (
            batch,
            TaskOutcome::Failure {
                reason: "run cancelled".to_string(),
            },
        );
    }

    match tokio::time::timeout(timeout, (*fetch)(batch.clone())).await {
        Ok(Ok(payload)) => (batch, TaskOutcome::Success(payload)),
        Ok(Err(e)) => {
            tracing::warn!(
                batch = batch.index,
                units = batch.len(),
                error = %e,
                "batch fetch failed"
            );
            (
                batch,
                TaskOutcome::Failure {
                    reason: e.to_string(),
                },
            )
        }
        Err(_) => {
            tracing::warn!(
                batch = batch.index,
                units = batch.len(),
                timeout_ms = timeout.as_millis() as u64,
                "batch fetch timed out"
            );
            (
                batch,
                TaskOutcome::Failure {
                    reason: format!("timed out after {}ms", timeout.as_millis()),
                },
            )
        }
    }
}

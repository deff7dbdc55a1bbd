//! Result collection — single-consumer drain of the pool's outcome stream
//!
//! The collector is the only writer of the success and failure accumulators:
//! fetches run concurrently, but completions are processed strictly one at a
//! time here. One `BatchFinished` event is emitted per attempted batch,
//! success and failure alike, so progress reflects "attempted" rather than
//! "succeeded".

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::ReceiverStream;

use crate::types::{Batch, Event, TaskOutcome};

/// Accumulated outcomes of one pool run
pub(crate) struct Collected<P> {
    /// Batches that produced a payload, in completion order
    pub(crate) successes: Vec<(Batch, P)>,
    /// Batches that failed, with their originating work units intact
    pub(crate) failures: Vec<Batch>,
}

impl<P> Collected<P> {
    /// Total number of batches that produced an outcome
    pub(crate) fn attempted(&self) -> usize {
        self.successes.len() + self.failures.len()
    }
}

/// Drain the outcome stream to completion
pub(crate) async fn drain<P>(
    mut outcomes: ReceiverStream<(Batch, TaskOutcome<P>)>,
    event_tx: &broadcast::Sender<Event>,
) -> Collected<P> {
    let mut successes = Vec::new();
    let mut failures = Vec::new();

    while let Some((batch, outcome)) = outcomes.next().await {
        // No subscribers is fine; progress is best-effort
        event_tx
            .send(Event::BatchFinished {
                batch_index: batch.index,
                units: batch.len(),
                failed: outcome.is_failure(),
            })
            .ok();

        match outcome {
            TaskOutcome::Success(payload) => successes.push((batch, payload)),
            TaskOutcome::Failure { reason } => {
                tracing::debug!(batch = batch.index, %reason, "failure recorded");
                failures.push(batch);
            }
        }
    }

    Collected {
        successes,
        failures,
    }
}

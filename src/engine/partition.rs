//! Work-unit partitioning

use crate::error::{Error, Result};
use crate::types::{Batch, ImageId};

/// Split an ordered unit collection into fixed-size batches
///
/// Pure function. Batch count is `ceil(len / size)`; every batch except
/// possibly the last holds exactly `size` units; concatenating the batches in
/// emission order reconstructs the input exactly. Rejects `size == 0` before
/// any work starts.
pub fn partition(units: Vec<ImageId>, size: usize) -> Result<Vec<Batch>> {
    if size == 0 {
        return Err(Error::config(
            "fetch.batch_size",
            "batch size must be greater than zero",
        ));
    }

    Ok(units
        .chunks(size)
        .enumerate()
        .map(|(index, chunk)| Batch {
            index,
            units: chunk.to_vec(),
        })
        .collect())
}

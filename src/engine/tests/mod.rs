//! Tests for the engine: partitioning, pool dispatch, collection, and full runs.


use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use crate::client::{ListQuery, RecordFetcher};
use crate::config::{Config, FetchConfig, StorageConfig};
use crate::error::{Error, Result};
use crate::types::{ImageId, Include, MetadataRecord};

/// Generate `n` sequential image ids (ISIC_0000000, ISIC_0000001, ...)
pub(super) fn ids(n: usize) -> Vec<ImageId> {
    (0..n)
        .map(|i| ImageId::from(format!("ISIC_{i:07}")))
        .collect()
}

/// Config pointing all storage at a temp dir, with a short fetch timeout
pub(super) fn test_config(dir: &std::path::Path) -> Config {
    Config {
        fetch: FetchConfig {
            batch_size: 300,
            workers: 5,
            request_timeout: Duration::from_millis(200),
            batch_delay: None,
        },
        storage: StorageConfig {
            download_dir: dir.join("downloads"),
            dataset_file: dir.join("metadata.csv"),
            ledger_file: dir.join(".failed_download_batches.json"),
        },
        ..Config::default()
    }
}

/// A metadata record derived from an id, as the mock fetcher returns it
pub(super) fn mock_record(id: &ImageId) -> MetadataRecord {
    MetadataRecord {
        isic_id: id.as_str().to_string(),
        name: Some(id.as_str().to_string()),
        dataset: Some("TEST".to_string()),
        diagnosis: None,
        benign_malignant: None,
        age_approx: None,
        sex: None,
    }
}

/// Scriptable in-memory [`RecordFetcher`]
///
/// A batch containing a `fail` id errors immediately; a batch containing a
/// `hang` id never completes (so the pool's per-fetch timeout fires). All
/// requested ids are recorded for assertions on unit-source substitution.
#[derive(Default)]
pub(super) struct MockFetcher {
    pub(super) fail: HashSet<ImageId>,
    pub(super) hang: HashSet<ImageId>,
    pub(super) listing: Vec<ImageId>,
    pub(super) requested: Mutex<Vec<ImageId>>,
}

impl MockFetcher {
    pub(super) fn failing_on(ids: impl IntoIterator<Item = ImageId>) -> Self {
        Self {
            fail: ids.into_iter().collect(),
            ..Self::default()
        }
    }

    pub(super) fn hanging_on(ids: impl IntoIterator<Item = ImageId>) -> Self {
        Self {
            hang: ids.into_iter().collect(),
            ..Self::default()
        }
    }

    pub(super) fn requested_ids(&self) -> Vec<ImageId> {
        self.requested.lock().unwrap().clone()
    }

    async fn guard(&self, ids: &[ImageId]) -> Result<()> {
        self.requested.lock().unwrap().extend(ids.iter().cloned());

        if ids.iter().any(|id| self.hang.contains(id)) {
            std::future::pending::<()>().await;
        }
        if ids.iter().any(|id| self.fail.contains(id)) {
            return Err(Error::Api("induced batch failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl RecordFetcher for MockFetcher {
    async fn fetch_image_archive(&self, ids: &[ImageId], _include: Include) -> Result<Vec<u8>> {
        self.guard(ids).await?;
        Ok(format!("zip-payload-{}-units", ids.len()).into_bytes())
    }

    async fn fetch_metadata(&self, ids: &[ImageId]) -> Result<Vec<MetadataRecord>> {
        self.guard(ids).await?;
        Ok(ids.iter().map(mock_record).collect())
    }

    async fn list_image_ids(&self, _query: &ListQuery) -> Result<Vec<ImageId>> {
        Ok(self.listing.clone())
    }
}

//! Persisted metadata dataset — CSV store and key-based reconciliation
//!
//! The dataset is a row-oriented CSV file keyed by the `isic_id` column, with
//! at most one row per key. Two merge policies exist and are never mixed
//! within a run:
//!
//! - **fresh** runs build the dataset from incoming records, deduplicating
//!   first-seen-wins over the incoming order;
//! - **retry** runs treat the on-disk dataset as authoritative: every existing
//!   row is kept untouched and only genuinely new keys are appended, in
//!   incoming order.
//!
//! Persistence is atomic relative to process crash: rows are written to a
//! temporary file in the same directory and renamed over the destination, so
//! a crash mid-write leaves the previous dataset intact.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{DatasetError, Result};
use crate::types::{ImageId, MetadataRecord};

/// Deduplicate records by key, keeping the first occurrence in input order
pub fn dedup_first_seen(incoming: Vec<MetadataRecord>) -> Vec<MetadataRecord> {
    let mut seen = HashSet::new();
    incoming
        .into_iter()
        .filter(|record| seen.insert(record.key().to_string()))
        .collect()
}

/// Append to `existing` the incoming records whose key is not already present
///
/// Existing row order is preserved, followed by new rows in incoming order.
/// On a key conflict the existing row wins; the incoming duplicate is dropped.
pub fn merge_new_keys(
    mut existing: Vec<MetadataRecord>,
    incoming: Vec<MetadataRecord>,
) -> Vec<MetadataRecord> {
    let mut seen: HashSet<String> = existing.iter().map(|r| r.key().to_string()).collect();
    for record in incoming {
        if seen.insert(record.key().to_string()) {
            existing.push(record);
        }
    }
    existing
}

/// CSV-backed store for the metadata dataset
#[derive(Clone, Debug)]
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    /// Create a store backed by the given CSV file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The dataset file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a dataset file currently exists
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load every row of the persisted dataset
    ///
    /// Fails with [`DatasetError::MissingBase`] when no file exists.
    pub fn load(&self) -> Result<Vec<MetadataRecord>> {
        if !self.exists() {
            return Err(DatasetError::MissingBase {
                path: self.path.clone(),
            }
            .into());
        }

        let mut reader =
            csv::Reader::from_path(&self.path).map_err(|e| DatasetError::Malformed {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;

        let mut records = Vec::new();
        for row in reader.deserialize() {
            let record: MetadataRecord = row.map_err(|e| DatasetError::Malformed {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
            records.push(record);
        }
        Ok(records)
    }

    /// Merge incoming records into the store and persist the result
    ///
    /// `is_retry` selects the reconciliation policy described in the module
    /// docs. A retry against a missing base dataset fails before any write.
    /// Returns the merged rows as written.
    pub fn reconcile(
        &self,
        incoming: Vec<MetadataRecord>,
        is_retry: bool,
    ) -> Result<Vec<MetadataRecord>> {
        let merged = if is_retry {
            let existing = self.load()?;
            let before = existing.len();
            let merged = merge_new_keys(existing, incoming);
            tracing::info!(
                path = %self.path.display(),
                existing = before,
                appended = merged.len() - before,
                "reconciled retry results into dataset"
            );
            merged
        } else {
            let merged = dedup_first_seen(incoming);
            tracing::info!(
                path = %self.path.display(),
                rows = merged.len(),
                "built fresh dataset"
            );
            merged
        };

        self.persist(&merged)?;
        Ok(merged)
    }

    /// Write the given rows atomically over the dataset file
    ///
    /// Writes to `<dataset>.tmp` in the same directory, then renames into
    /// place. On any failure the previous dataset file is left untouched.
    pub fn persist(&self, records: &[MetadataRecord]) -> Result<()> {
        let tmp_path = self.tmp_path();

        let write_result = (|| -> std::result::Result<(), String> {
            let mut writer = csv::Writer::from_path(&tmp_path).map_err(|e| e.to_string())?;
            for record in records {
                writer.serialize(record).map_err(|e| e.to_string())?;
            }
            writer.flush().map_err(|e| e.to_string())?;
            Ok(())
        })();

        if let Err(reason) = write_result {
            // Best-effort cleanup of the partial temp file
            let _ = std::fs::remove_file(&tmp_path);
            return Err(DatasetError::Persist {
                path: self.path.clone(),
                reason,
            }
            .into());
        }

        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp_path);
            DatasetError::Persist {
                path: self.path.clone(),
                reason: format!("failed to move temp file into place: {e}"),
            }
        })?;
        Ok(())
    }

    /// The image ids of every row belonging to the named dataset
    pub fn image_ids(&self, dataset: &str) -> Result<Vec<ImageId>> {
        let ids = self
            .load()?
            .into_iter()
            .filter(|record| record.dataset.as_deref() == Some(dataset))
            .map(|record| ImageId::from(record.isic_id))
            .collect();
        Ok(ids)
    }

    /// Per-dataset row counts, most populous first
    ///
    /// This backs the "show available datasets" listing when no dataset name
    /// is given for a download run.
    pub fn dataset_counts(&self) -> Result<Vec<(String, usize)>> {
        let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
        for record in self.load()? {
            if let Some(dataset) = record.dataset {
                *counts.entry(dataset).or_insert(0) += 1;
            }
        }

        let mut counts: Vec<(String, usize)> = counts.into_iter().collect();
        // Most instances first; name order breaks ties so output is stable
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(counts)
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

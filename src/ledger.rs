//! Durable failure ledger for partially failed runs
//!
//! A run that ends with failed batches writes the ids of every unit in those
//! batches to a single JSON array on disk. A later run configured as a retry
//! loads that array *in place of* its primary unit source — this substitution
//! is the only retry scoping the engine performs. A fully successful run
//! removes the ledger so no stale file can reference already-recovered units.

use std::path::{Path, PathBuf};

use crate::error::{LedgerError, Result};
use crate::types::ImageId;

/// Reads and writes the on-disk record of failed work units
#[derive(Clone, Debug)]
pub struct FailureLedger {
    path: PathBuf,
}

impl FailureLedger {
    /// Create a ledger backed by the given file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The ledger file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a ledger file currently exists
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Persist the given units, overwriting any prior ledger
    ///
    /// Failing to write when failures exist is a data-loss risk, so the error
    /// carries the units that could not be recorded for the caller to report.
    pub fn persist(&self, units: &[ImageId]) -> Result<()> {
        let body = serde_json::to_vec_pretty(units).map_err(|e| LedgerError::Persist {
            path: self.path.clone(),
            units: units.len(),
            reason: e.to_string(),
            lost: units.to_vec(),
        })?;

        std::fs::write(&self.path, body).map_err(|e| LedgerError::Persist {
            path: self.path.clone(),
            units: units.len(),
            reason: e.to_string(),
            lost: units.to_vec(),
        })?;

        tracing::info!(
            path = %self.path.display(),
            units = units.len(),
            "failure ledger written"
        );
        Ok(())
    }

    /// Load the units recorded by a previous run
    pub fn load(&self) -> Result<Vec<ImageId>> {
        let body = std::fs::read_to_string(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LedgerError::NotFound {
                    path: self.path.clone(),
                }
            } else {
                LedgerError::Corrupt {
                    path: self.path.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let units: Vec<ImageId> =
            serde_json::from_str(&body).map_err(|e| LedgerError::Corrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            path = %self.path.display(),
            units = units.len(),
            "failure ledger loaded for retry"
        );
        Ok(units)
    }

    /// Remove any existing ledger file
    ///
    /// Called after a fully successful run. A missing file is not an error.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "stale failure ledger removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn ids(raw: &[&str]) -> Vec<ImageId> {
        raw.iter().map(|s| ImageId::from(*s)).collect()
    }

    #[test]
    fn persist_then_load_round_trips_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FailureLedger::new(dir.path().join("ledger.json"));

        let units = ids(&["ISIC_0000003", "ISIC_0000001", "ISIC_0000002"]);
        ledger.persist(&units).unwrap();

        let loaded = ledger.load().unwrap();
        assert_eq!(loaded, units, "order must be preserved");
    }

    #[test]
    fn persist_overwrites_prior_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FailureLedger::new(dir.path().join("ledger.json"));

        ledger.persist(&ids(&["ISIC_A", "ISIC_B"])).unwrap();
        ledger.persist(&ids(&["ISIC_C"])).unwrap();

        assert_eq!(ledger.load().unwrap(), ids(&["ISIC_C"]));
    }

    #[test]
    fn load_without_ledger_fails_with_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FailureLedger::new(dir.path().join("absent.json"));

        let err = ledger.load().unwrap_err();
        assert!(matches!(
            err,
            Error::Ledger(LedgerError::NotFound { .. })
        ));
    }

    #[test]
    fn load_rejects_malformed_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, "{\"not\": \"an array\"}").unwrap();

        let ledger = FailureLedger::new(&path);
        let err = ledger.load().unwrap_err();
        assert!(matches!(err, Error::Ledger(LedgerError::Corrupt { .. })));
    }

    #[test]
    fn clear_removes_file_and_tolerates_absence() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FailureLedger::new(dir.path().join("ledger.json"));

        ledger.persist(&ids(&["ISIC_X"])).unwrap();
        assert!(ledger.exists());

        ledger.clear().unwrap();
        assert!(!ledger.exists());

        // Second clear is a no-op, not an error
        ledger.clear().unwrap();
    }

    #[test]
    fn persist_failure_reports_lost_units() {
        let dir = tempfile::tempdir().unwrap();
        // Point the ledger at a path whose parent does not exist
        let ledger = FailureLedger::new(dir.path().join("missing").join("ledger.json"));

        let units = ids(&["ISIC_1", "ISIC_2"]);
        let err = ledger.persist(&units).unwrap_err();
        match err {
            Error::Ledger(LedgerError::Persist { units: n, lost, .. }) => {
                assert_eq!(n, 2);
                assert_eq!(lost, units);
            }
            other => panic!("expected Persist error, got {other:?}"),
        }
    }
}

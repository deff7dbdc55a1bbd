//! Configuration types for archive-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Fetch behavior configuration (batching, concurrency, rate limiting)
///
/// Groups settings for how batches are dispatched against the remote API.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Number of work units per batch (default: 300, the archive's maximum
    /// download request size)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum number of concurrent in-flight batch fetches (default: 5)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Timeout applied to each individual batch fetch (default: 60 seconds)
    ///
    /// A timed-out fetch is an ordinary batch failure; it is recorded in the
    /// ledger and never aborts the run.
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Optional cooldown between dispatch rounds (default: none)
    ///
    /// When set, batches are dispatched in whole rounds of `workers` and the
    /// cooldown sleeps between rounds. Used to respect upstream rate limits.
    #[serde(default, with = "optional_duration_serde")]
    pub batch_delay: Option<Duration>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            workers: default_workers(),
            request_timeout: default_request_timeout(),
            batch_delay: None,
        }
    }
}

/// On-disk layout configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory image archives are downloaded into (default: "./isic_images")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Path of the persisted metadata dataset (default: "./metadata.csv")
    #[serde(default = "default_dataset_file")]
    pub dataset_file: PathBuf,

    /// Path of the failure ledger written after partially failed runs
    /// (default: "./.failed_download_batches.json")
    #[serde(default = "default_ledger_file")]
    pub ledger_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            dataset_file: default_dataset_file(),
            ledger_file: default_ledger_file(),
        }
    }
}

/// Remote archive API configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the archive service (default: "https://isic-archive.com")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Username for authenticated access (anonymous when absent)
    #[serde(default)]
    pub username: Option<String>,

    /// Password for authenticated access
    #[serde(default)]
    pub password: Option<String>,

    /// Page size for listing endpoints (default: 50)
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            username: None,
            password: None,
            page_size: default_page_size(),
        }
    }
}

/// Main configuration for [`ArchiveFetcher`](crate::engine::ArchiveFetcher)
///
/// Fields are organized into logical sub-configs:
/// - [`fetch`](FetchConfig) — batching, concurrency, rate limiting
/// - [`storage`](StorageConfig) — download directory, dataset and ledger paths
/// - [`api`](ApiConfig) — remote service location and credentials
///
/// Configuration is an explicit value handed to the engine at construction;
/// its lifecycle is scoped to one run invocation and nothing in the library
/// reads process-global state.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Fetch behavior settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// On-disk layout settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Remote API settings
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Validate the configuration, rejecting values no work should start with
    pub fn validate(&self) -> Result<()> {
        if self.fetch.batch_size == 0 {
            return Err(Error::config(
                "fetch.batch_size",
                "batch size must be greater than zero",
            ));
        }
        if self.fetch.workers == 0 {
            return Err(Error::config(
                "fetch.workers",
                "worker count must be greater than zero",
            ));
        }
        if self.api.page_size == 0 {
            return Err(Error::config(
                "api.page_size",
                "page size must be greater than zero",
            ));
        }
        if url::Url::parse(&self.api.base_url).is_err() {
            return Err(Error::config(
                "api.base_url",
                format!("not a valid URL: {}", self.api.base_url),
            ));
        }
        Ok(())
    }
}

fn default_batch_size() -> usize {
    300
}

fn default_workers() -> usize {
    5
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./isic_images")
}

fn default_dataset_file() -> PathBuf {
    PathBuf::from("./metadata.csv")
}

fn default_ledger_file() -> PathBuf {
    PathBuf::from("./.failed_download_batches.json")
}

fn default_base_url() -> String {
    "https://isic-archive.com".to_string()
}

fn default_page_size() -> usize {
    50
}

// Duration serialization helper (seconds as integers)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.fetch.batch_size, 300);
        assert_eq!(config.fetch.workers, 5);
        assert_eq!(config.fetch.request_timeout, Duration::from_secs(60));
        assert!(config.fetch.batch_delay.is_none());
        assert_eq!(config.api.page_size, 50);
    }

    #[test]
    fn empty_json_deserializes_to_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.fetch.batch_size, 300);
        assert_eq!(
            config.storage.ledger_file,
            PathBuf::from("./.failed_download_batches.json")
        );
        assert_eq!(config.api.base_url, "https://isic-archive.com");
    }

    #[test]
    fn durations_round_trip_as_seconds() {
        let config = Config {
            fetch: FetchConfig {
                request_timeout: Duration::from_secs(5),
                batch_delay: Some(Duration::from_secs(2)),
                ..FetchConfig::default()
            },
            ..Config::default()
        };

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["fetch"]["request_timeout"], 5);
        assert_eq!(json["fetch"]["batch_delay"], 2);

        let back: Config = serde_json::from_value(json).unwrap();
        assert_eq!(back.fetch.request_timeout, Duration::from_secs(5));
        assert_eq!(back.fetch.batch_delay, Some(Duration::from_secs(2)));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let config = Config {
            fetch: FetchConfig {
                batch_size: 0,
                ..FetchConfig::default()
            },
            ..Config::default()
        };

        let err = config.validate().unwrap_err();
        match err {
            Error::Config { key, .. } => assert_eq!(key.as_deref(), Some("fetch.batch_size")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn zero_workers_is_rejected() {
        let config = Config {
            fetch: FetchConfig {
                workers: 0,
                ..FetchConfig::default()
            },
            ..Config::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let config = Config {
            api: ApiConfig {
                base_url: "not a url".to_string(),
                ..ApiConfig::default()
            },
            ..Config::default()
        };

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("not a valid URL"));
    }
}

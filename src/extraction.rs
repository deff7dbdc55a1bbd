//! Zip archive extraction
//!
//! Batch downloads arrive as one zip archive per batch. This module detects
//! the archives in a download directory and extracts them all into a single
//! destination directory. Extraction runs on blocking threads, bounded by the
//! configured worker count; the first archive is extracted before the
//! concurrent phase so the shared directory skeleton exists when the rest
//! race to create it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::error::{Error, Result};

/// Outcome of extracting a directory of archives
///
/// Individual archive failures do not abort the remaining extractions; they
/// are collected here for the caller to report.
#[derive(Debug, Default)]
pub struct ExtractionSummary {
    /// Number of archives extracted successfully
    pub extracted: usize,
    /// Archives that failed to extract
    pub failed: Vec<PathBuf>,
}

/// Archive extractor for ZIP files
pub struct ZipExtractor;

impl ZipExtractor {
    /// Detect ZIP archive files in a directory
    pub fn detect_zip_files(download_path: &Path) -> Result<Vec<PathBuf>> {
        tracing::debug!(path = %download_path.display(), "detecting ZIP archives");

        let mut archives = Vec::new();
        for entry in std::fs::read_dir(download_path)? {
            let path = entry?.path();
            if path.is_dir() {
                continue;
            }
            if let Some(ext) = path.extension()
                && ext.to_string_lossy().eq_ignore_ascii_case("zip")
            {
                archives.push(path);
            }
        }
        archives.sort();

        tracing::debug!("found {} ZIP archive(s)", archives.len());
        Ok(archives)
    }

    /// Extract a single archive into the destination directory
    ///
    /// Entries whose paths would escape the destination are skipped.
    pub fn extract_archive(archive_path: &Path, dest: &Path) -> Result<()> {
        let extraction_failed = |reason: String| Error::Extraction {
            archive: archive_path.to_path_buf(),
            reason,
        };

        let file = std::fs::File::open(archive_path).map_err(|e| {
            extraction_failed(format!("failed to open archive: {e}"))
        })?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| extraction_failed(format!("failed to read archive: {e}")))?;

        for index in 0..archive.len() {
            let mut entry = archive
                .by_index(index)
                .map_err(|e| extraction_failed(format!("failed to read entry {index}: {e}")))?;

            let entry_path = match entry.enclosed_name() {
                Some(path) => dest.join(path),
                None => {
                    tracing::warn!(
                        archive = %archive_path.display(),
                        entry = entry.name(),
                        "skipping entry with unsafe path"
                    );
                    continue;
                }
            };

            if entry.is_dir() {
                std::fs::create_dir_all(&entry_path)
                    .map_err(|e| extraction_failed(format!("failed to create directory: {e}")))?;
                continue;
            }

            if let Some(parent) = entry_path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| extraction_failed(format!("failed to create directory: {e}")))?;
            }

            let mut out = std::fs::File::create(&entry_path)
                .map_err(|e| extraction_failed(format!("failed to create file: {e}")))?;
            std::io::copy(&mut entry, &mut out)
                .map_err(|e| extraction_failed(format!("failed to write entry: {e}")))?;
        }

        tracing::debug!(archive = %archive_path.display(), "archive extracted");
        Ok(())
    }

    /// Extract every detected archive in `download_path` into `dest`
    ///
    /// At most `workers` extractions run concurrently.
    pub async fn extract_all(
        download_path: &Path,
        dest: &Path,
        workers: usize,
    ) -> Result<ExtractionSummary> {
        let mut archives = Self::detect_zip_files(download_path)?;
        tokio::fs::create_dir_all(dest).await?;

        let mut summary = ExtractionSummary::default();
        if archives.is_empty() {
            return Ok(summary);
        }

        // Extract the first archive up front: it lays down the directory
        // skeleton the concurrent extractions would otherwise race to create
        let first = archives.remove(0);
        match Self::extract_blocking(first.clone(), dest.to_path_buf()).await {
            Ok(()) => summary.extracted += 1,
            Err(e) => {
                tracing::error!(archive = %first.display(), error = %e, "extraction failed");
                summary.failed.push(first);
            }
        }

        let dest = Arc::new(dest.to_path_buf());
        let results: Vec<(PathBuf, Result<()>)> = stream::iter(archives)
            .map(|archive| {
                let dest = Arc::clone(&dest);
                async move {
                    let result =
                        Self::extract_blocking(archive.clone(), dest.as_ref().clone()).await;
                    (archive, result)
                }
            })
            .buffer_unordered(workers.max(1))
            .collect()
            .await;

        for (archive, result) in results {
            match result {
                Ok(()) => summary.extracted += 1,
                Err(e) => {
                    tracing::error!(archive = %archive.display(), error = %e, "extraction failed");
                    summary.failed.push(archive);
                }
            }
        }

        tracing::info!(
            extracted = summary.extracted,
            failed = summary.failed.len(),
            dest = %dest.display(),
            "extraction finished"
        );
        Ok(summary)
    }

    /// Run one extraction on a blocking thread
    async fn extract_blocking(archive: PathBuf, dest: PathBuf) -> Result<()> {
        let archive_for_error = archive.clone();
        tokio::task::spawn_blocking(move || Self::extract_archive(&archive, &dest))
            .await
            .map_err(|e| Error::Extraction {
                archive: archive_for_error,
                reason: format!("extraction task panicked: {e}"),
            })?
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default();
        for (name, body) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(body).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn detect_finds_only_zip_files() {
        let dir = tempfile::tempdir().unwrap();
        write_zip(&dir.path().join("download_0.zip"), &[("a.jpg", b"x")]);
        std::fs::write(dir.path().join("notes.txt"), b"not an archive").unwrap();
        std::fs::create_dir(dir.path().join("nested.zip.d")).unwrap();

        let archives = ZipExtractor::detect_zip_files(dir.path()).unwrap();
        assert_eq!(archives.len(), 1);
        assert!(archives[0].ends_with("download_0.zip"));
    }

    #[tokio::test]
    async fn extract_all_collects_every_archive_into_dest() {
        let downloads = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();

        write_zip(
            &downloads.path().join("download_0.zip"),
            &[("ISIC_0000001.jpg", b"img1"), ("ISIC_0000002.jpg", b"img2")],
        );
        write_zip(
            &downloads.path().join("download_1.zip"),
            &[("ISIC_0000003.jpg", b"img3")],
        );

        let summary = ZipExtractor::extract_all(downloads.path(), dest.path(), 4)
            .await
            .unwrap();
        assert_eq!(summary.extracted, 2);
        assert!(summary.failed.is_empty());

        let mut extracted: Vec<String> = walkdir::WalkDir::new(dest.path())
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        extracted.sort();
        assert_eq!(
            extracted,
            vec!["ISIC_0000001.jpg", "ISIC_0000002.jpg", "ISIC_0000003.jpg"]
        );
    }

    #[tokio::test]
    async fn corrupt_archive_is_reported_not_fatal() {
        let downloads = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();

        write_zip(&downloads.path().join("download_0.zip"), &[("ok.jpg", b"x")]);
        std::fs::write(downloads.path().join("download_1.zip"), b"not a zip").unwrap();

        let summary = ZipExtractor::extract_all(downloads.path(), dest.path(), 2)
            .await
            .unwrap();
        assert_eq!(summary.extracted, 1);
        assert_eq!(summary.failed.len(), 1);
        assert!(summary.failed[0].ends_with("download_1.zip"));
    }

    #[tokio::test]
    async fn empty_download_dir_extracts_nothing() {
        let downloads = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();

        let summary = ZipExtractor::extract_all(downloads.path(), dest.path(), 2)
            .await
            .unwrap();
        assert_eq!(summary.extracted, 0);
        assert!(summary.failed.is_empty());
    }
}

//! Utility functions for file operations

use std::path::Path;

use crate::error::Result;

/// Gather a directory's file names into a JSON array file
///
/// Writes the names (not full paths) of every regular file directly under
/// `dir` to `output` as a pretty-printed JSON array, sorted for stable
/// output. Returns the number of names written.
pub fn gather(dir: &Path, output: &Path) -> Result<usize> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();

    std::fs::write(output, serde_json::to_vec_pretty(&names)?)?;
    tracing::info!(
        dir = %dir.display(),
        output = %output.display(),
        files = names.len(),
        "gathered directory listing"
    );
    Ok(names.len())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gather_writes_sorted_file_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.zip"), b"b").unwrap();
        std::fs::write(dir.path().join("a.zip"), b"a").unwrap();
        std::fs::create_dir(dir.path().join("subdir")).unwrap();

        let output = dir.path().join("listing.json");
        let count = gather(dir.path(), &output).unwrap();
        assert_eq!(count, 2, "directories are not listed");

        let names: Vec<String> =
            serde_json::from_slice(&std::fs::read(&output).unwrap()).unwrap();
        assert_eq!(names, vec!["a.zip".to_string(), "b.zip".to_string()]);
    }

    #[test]
    fn gather_missing_dir_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = gather(&dir.path().join("absent"), &dir.path().join("out.json")).unwrap_err();
        assert!(matches!(err, crate::error::Error::Io(_)));
    }
}

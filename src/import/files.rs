//! Input file discovery
//!
//! Expands a glob such as `out/dump.*.json.gz` into the sorted list of
//! regular files it matches.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;
use wax::Glob;

use crate::error::{ConfigError, DumpError, Result};

/// Expand a glob pattern into matching regular files
///
/// A pattern without wildcards naming an existing file matches that file.
///
/// # Arguments
/// * `pattern` - Glob pattern, relative to the working directory or absolute
///
/// # Returns
/// * `Result<Vec<PathBuf>>` - Matches in lexicographic order; never empty
pub fn expand_pattern(pattern: &str) -> Result<Vec<PathBuf>> {
    if pattern.trim().is_empty() {
        return Err(ConfigError::MissingField("files".to_string()).into());
    }

    let literal = Path::new(pattern);
    if literal.is_file() {
        return Ok(vec![literal.to_path_buf()]);
    }

    let glob = Glob::new(pattern).map_err(|e| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;
    let (prefix, glob) = glob.partition();

    let relative = prefix.as_os_str().is_empty();
    let root = if relative { PathBuf::from(".") } else { prefix };
    if !root.is_dir() {
        return Err(ConfigError::NoFilesMatched(pattern.to_string()).into());
    }

    let mut files = Vec::new();
    for entry in glob.walk(&root) {
        let entry = entry.map_err(|e| DumpError::Io(io::Error::other(e)))?;
        let path = entry.path();
        let metadata = std::fs::metadata(path).map_err(|e| DumpError::file("reading", path, e))?;
        if !metadata.is_file() {
            continue;
        }
        let path = if relative {
            path.strip_prefix(".").unwrap_or(path)
        } else {
            path
        };
        files.push(path.to_path_buf());
    }

    if files.is_empty() {
        return Err(ConfigError::NoFilesMatched(pattern.to_string()).into());
    }

    files.sort();
    debug!("Pattern {:?} matched {} file(s)", pattern, files.len());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn test_matches_sorted_files_only() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "dump.00000002.json.gz");
        touch(dir.path(), "dump.00000000.json.gz");
        touch(dir.path(), "dump.00000001.json.gz");
        touch(dir.path(), "other.json.gz");
        fs::create_dir(dir.path().join("dump.dir.json.gz")).unwrap();

        let pattern = format!("{}/dump.*.json.gz", dir.path().display());
        let files = expand_pattern(&pattern).unwrap();

        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "dump.00000000.json.gz",
                "dump.00000001.json.gz",
                "dump.00000002.json.gz"
            ]
        );
    }

    #[test]
    fn test_literal_path() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "dump.json.gz");
        let path = dir.path().join("dump.json.gz");

        let files = expand_pattern(&path.display().to_string()).unwrap();
        assert_eq!(files, vec![path]);
    }

    #[test]
    fn test_no_match_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = format!("{}/missing.*.json.gz", dir.path().display());

        assert!(matches!(
            expand_pattern(&pattern),
            Err(DumpError::Config(ConfigError::NoFilesMatched(_)))
        ));
    }

    #[test]
    fn test_missing_directory_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = format!("{}/nope/*.json.gz", dir.path().display());

        assert!(matches!(
            expand_pattern(&pattern),
            Err(DumpError::Config(ConfigError::NoFilesMatched(_)))
        ));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            expand_pattern("dump.[.json.gz"),
            Err(DumpError::Config(ConfigError::InvalidPattern { .. }))
        ));
        assert!(matches!(
            expand_pattern(""),
            Err(DumpError::Config(ConfigError::MissingField(_)))
        ));
    }
}

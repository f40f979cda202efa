//! Gzip-compressed output files with record-count rotation
//!
//! Records are appended to `<prefix>.<ext>`, or, when a per-file budget is
//! set, to a numbered file set `<prefix>.00000000.<ext>`,
//! `<prefix>.00000001.<ext>` and so on. Every file is a complete gzip
//! stream, finalized before the next one is created.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::{debug, error};

use crate::error::{DumpError, Result};

/// Write buffer in front of the compressor
const BUFFER_SIZE: usize = 1024 * 1024;

/// Build the path of one file of a set
///
/// # Arguments
/// * `prefix` - Path prefix given by the user
/// * `extension` - Extension without leading dot, e.g. `json.gz`
/// * `split` - Whether files are numbered
/// * `index` - Zero-based file index, ignored when not split
pub fn file_name(prefix: &str, extension: &str, split: bool, index: u32) -> PathBuf {
    let extension = extension.trim_start_matches('.');
    if split {
        PathBuf::from(format!("{prefix}.{index:08}.{extension}"))
    } else {
        PathBuf::from(format!("{prefix}.{extension}"))
    }
}

struct OpenFile {
    path: PathBuf,
    encoder: GzEncoder<BufWriter<File>>,
    records: u64,
}

/// Append-only writer over a rotating set of gzip files.
pub struct CompressedFileRotator {
    prefix: String,
    extension: String,
    records_per_file: u64,
    level: Compression,
    current: Option<OpenFile>,
    paths: Vec<PathBuf>,
    records: u64,
    bytes: u64,
    finished: bool,
}

impl CompressedFileRotator {
    /// Create the rotator and its first file
    ///
    /// # Arguments
    /// * `prefix` - Output path prefix
    /// * `records_per_file` - Records per file, 0 for a single file
    /// * `extension` - File extension without leading dot
    /// * `level` - Gzip compression level
    ///
    /// # Returns
    /// * `Result<Self>` - Rotator with the first file open, or error
    pub fn create(
        prefix: &str,
        records_per_file: u64,
        extension: &str,
        level: Compression,
    ) -> Result<Self> {
        validate_prefix(prefix)?;

        let mut rotator = Self {
            prefix: prefix.to_string(),
            extension: extension.trim_start_matches('.').to_string(),
            records_per_file,
            level,
            current: None,
            paths: Vec::new(),
            records: 0,
            bytes: 0,
            finished: false,
        };
        let first = rotator.open_next()?;
        rotator.current = Some(first);
        Ok(rotator)
    }

    /// Append one encoded record
    ///
    /// # Arguments
    /// * `line` - Encoded record, newline included
    ///
    /// # Returns
    /// * `Result<()>` - Success or I/O error
    pub fn append(&mut self, line: &[u8]) -> Result<()> {
        if self.finished {
            return Err(DumpError::Generic(format!(
                "file set {} is already finalized",
                self.prefix
            )));
        }

        let file = match self.current.take() {
            Some(file) => file,
            None => self.open_next()?,
        };
        let file = self.current.insert(file);
        file.encoder
            .write_all(line)
            .map_err(|e| DumpError::file("writing", &file.path, e))?;
        file.records += 1;
        self.records += 1;
        self.bytes += line.len() as u64;

        if self.records_per_file > 0 && file.records >= self.records_per_file {
            self.close_current()?;
        }
        Ok(())
    }

    /// Finalize the open file
    ///
    /// Only the first call has an effect.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.close_current()
    }

    /// Files produced so far, in order
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Records accepted so far
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Uncompressed bytes accepted so far
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    fn open_next(&mut self) -> Result<OpenFile> {
        let index = self.paths.len() as u32;
        let path = file_name(&self.prefix, &self.extension, self.records_per_file > 0, index);
        let file = File::create(&path).map_err(|e| DumpError::file("creating", &path, e))?;
        debug!("Created output file {}", path.display());

        self.paths.push(path.clone());
        let encoder = GzEncoder::new(BufWriter::with_capacity(BUFFER_SIZE, file), self.level);
        Ok(OpenFile {
            path,
            encoder,
            records: 0,
        })
    }

    fn close_current(&mut self) -> Result<()> {
        let Some(file) = self.current.take() else {
            return Ok(());
        };
        let mut writer = file
            .encoder
            .finish()
            .map_err(|e| DumpError::file("compressing", &file.path, e))?;
        writer
            .flush()
            .map_err(|e| DumpError::file("closing", &file.path, e))?;
        debug!(
            "Finalized {} ({} records)",
            file.path.display(),
            file.records
        );
        Ok(())
    }
}

impl Drop for CompressedFileRotator {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.finish() {
                error!("{}", e);
            }
        }
    }
}

/// Check that the directory of the prefix exists
///
/// # Arguments
/// * `prefix` - Output path prefix
///
/// # Returns
/// * `Result<()>` - Success or a configuration error naming `out`
pub fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        return Err(crate::error::ConfigError::MissingField("out".to_string()).into());
    }
    if let Some(parent) = Path::new(prefix).parent() {
        if !parent.as_os_str().is_empty() && !parent.is_dir() {
            return Err(crate::error::ConfigError::InvalidValue {
                field: "out".to_string(),
                value: format!("directory does not exist: {}", parent.display()),
            }
            .into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::MultiGzDecoder;
    use std::io::Read;

    fn read_lines(path: &Path) -> Vec<String> {
        let mut text = String::new();
        MultiGzDecoder::new(File::open(path).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        text.lines().map(str::to_string).collect()
    }

    fn prefix(dir: &tempfile::TempDir) -> String {
        dir.path().join("dump").display().to_string()
    }

    #[test]
    fn test_file_name() {
        assert_eq!(
            file_name("out/dump", "json.gz", true, 0),
            PathBuf::from("out/dump.00000000.json.gz")
        );
        assert_eq!(
            file_name("dump", ".json.gz", true, 12),
            PathBuf::from("dump.00000012.json.gz")
        );
        assert_eq!(file_name("dump", "json.gz", false, 3), PathBuf::from("dump.json.gz"));
    }

    #[test]
    fn test_rotation_counts() {
        let dir = tempfile::tempdir().unwrap();
        let mut rotator =
            CompressedFileRotator::create(&prefix(&dir), 2, "json.gz", Compression::best()).unwrap();

        for i in 0..5 {
            rotator.append(format!("{i}\n").as_bytes()).unwrap();
        }
        rotator.finish().unwrap();

        let paths = rotator.paths().to_vec();
        assert_eq!(paths.len(), 3);
        assert!(paths[2].ends_with("dump.00000002.json.gz"));

        let contents: Vec<Vec<String>> = paths.iter().map(|p| read_lines(p)).collect();
        assert_eq!(contents, vec![vec!["0", "1"], vec!["2", "3"], vec!["4"]]);
        assert_eq!(rotator.records(), 5);
        assert_eq!(rotator.bytes(), 10);
    }

    #[test]
    fn test_exact_multiple_has_no_trailing_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut rotator =
            CompressedFileRotator::create(&prefix(&dir), 2, "json.gz", Compression::fast()).unwrap();
        for i in 0..4 {
            rotator.append(format!("{i}\n").as_bytes()).unwrap();
        }
        rotator.finish().unwrap();

        assert_eq!(rotator.paths().len(), 2);
        assert!(!dir.path().join("dump.00000002.json.gz").exists());
    }

    #[test]
    fn test_no_split_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut rotator =
            CompressedFileRotator::create(&prefix(&dir), 0, "json.gz", Compression::best()).unwrap();
        for i in 0..7 {
            rotator.append(format!("{i}\n").as_bytes()).unwrap();
        }
        rotator.finish().unwrap();

        assert_eq!(rotator.paths(), &[dir.path().join("dump.json.gz")]);
        assert_eq!(read_lines(&rotator.paths()[0]).len(), 7);
    }

    #[test]
    fn test_zero_records_leaves_one_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut rotator =
            CompressedFileRotator::create(&prefix(&dir), 3, "json.gz", Compression::best()).unwrap();
        rotator.finish().unwrap();

        assert_eq!(rotator.paths().len(), 1);
        assert!(read_lines(&rotator.paths()[0]).is_empty());
    }

    #[test]
    fn test_finish_is_idempotent_and_blocks_appends() {
        let dir = tempfile::tempdir().unwrap();
        let mut rotator =
            CompressedFileRotator::create(&prefix(&dir), 0, "json.gz", Compression::best()).unwrap();
        rotator.append(b"a\n").unwrap();
        rotator.finish().unwrap();
        rotator.finish().unwrap();

        assert!(rotator.append(b"b\n").is_err());
        assert_eq!(read_lines(&rotator.paths()[0]), vec!["a"]);
    }

    #[test]
    fn test_drop_finalizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let mut rotator =
                CompressedFileRotator::create(&prefix(&dir), 0, "json.gz", Compression::best())
                    .unwrap();
            rotator.append(b"kept\n").unwrap();
            rotator.paths()[0].clone()
        };
        assert_eq!(read_lines(&path), vec!["kept"]);
    }

    #[test]
    fn test_missing_directory_fails_early() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("nope").join("dump").display().to_string();
        let result = CompressedFileRotator::create(&prefix, 0, "json.gz", Compression::best());
        assert!(matches!(result, Err(DumpError::Config(_))));
    }
}

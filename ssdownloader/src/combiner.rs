//! Reassembly of decrypted segments.
//!
//! Segments are named `<file>.<part>`; they are ordered by the numeric part
//! suffix and concatenated into `<file>`. A single segment is simply
//! renamed.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;
use tracing::debug;

/// Buffer size for copying segments (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Result type for combine operations.
pub type CombineResult<T> = Result<T, CombineError>;

/// Errors that can occur while combining segments.
#[derive(Debug, Error)]
pub enum CombineError {
    /// No segments were supplied.
    #[error("no file parts provided to combine")]
    Empty,

    /// One or more segments had a non-numeric part suffix.
    #[error("unable to sort file parts: {}", .errors.join(", "))]
    Sorting { errors: Vec<String> },

    /// The first segment does not end in `.<digits>`.
    #[error("file part '{path}' does not end in a numeric suffix")]
    InvalidSuffix { path: PathBuf },

    /// Reading, writing, renaming or deleting a file failed.
    #[error("i/o error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Outcome of a successful combine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedFile {
    pub path: PathBuf,
    pub bytes: u64,
}

fn suffix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^.+\.\d+$").unwrap())
}

/// Read the numeric part ordinal from a segment's file name.
fn part_ordinal(path: &Path) -> Result<u64, String> {
    let name = path.to_string_lossy();
    let suffix = name.rsplit_once('.').map(|(_, suffix)| suffix).unwrap_or("");
    suffix.parse::<u64>().map_err(|e| {
        format!(
            "'{}' has unparsable part suffix '{}': {}",
            path.display(),
            suffix,
            e
        )
    })
}

/// Order segments by part number, reporting every unparsable suffix at once.
fn sort_parts(parts: &[PathBuf]) -> CombineResult<Vec<PathBuf>> {
    let mut errors = Vec::new();
    let mut ordered = Vec::with_capacity(parts.len());
    for part in parts {
        match part_ordinal(part) {
            Ok(ordinal) => ordered.push((ordinal, part.clone())),
            Err(e) => errors.push(e),
        }
    }
    if !errors.is_empty() {
        return Err(CombineError::Sorting { errors });
    }
    ordered.sort_by_key(|(ordinal, _)| *ordinal);
    Ok(ordered.into_iter().map(|(_, path)| path).collect())
}

/// Combine decrypted segments into the final file.
///
/// Segments are deleted as they are copied. A failure part-way through
/// leaves the partially written output in place; the caller discovers it
/// through the size check.
pub fn combine_files(parts: &[PathBuf]) -> CombineResult<CombinedFile> {
    let sorted = sort_parts(parts)?;
    let first = sorted.first().ok_or(CombineError::Empty)?;

    let first_name = first.to_string_lossy();
    if !suffix_pattern().is_match(&first_name) {
        return Err(CombineError::InvalidSuffix {
            path: first.clone(),
        });
    }
    let output = match first_name.rsplit_once('.') {
        Some((base, _)) => PathBuf::from(base),
        None => {
            return Err(CombineError::InvalidSuffix {
                path: first.clone(),
            })
        }
    };

    if let [only] = sorted.as_slice() {
        fs::rename(only, &output).map_err(|e| CombineError::Io {
            path: only.clone(),
            source: e,
        })?;
        let bytes = fs::metadata(&output)
            .map_err(|e| CombineError::Io {
                path: output.clone(),
                source: e,
            })?
            .len();
        debug!(path = %output.display(), bytes, "single part renamed");
        return Ok(CombinedFile {
            path: output,
            bytes,
        });
    }

    let file = File::create(&output).map_err(|e| CombineError::Io {
        path: output.clone(),
        source: e,
    })?;
    let mut writer = BufWriter::new(file);
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut total = 0u64;

    for part in &sorted {
        let file = File::open(part).map_err(|e| CombineError::Io {
            path: part.clone(),
            source: e,
        })?;
        let mut reader = BufReader::new(file);
        loop {
            let bytes_read = reader.read(&mut buffer).map_err(|e| CombineError::Io {
                path: part.clone(),
                source: e,
            })?;
            if bytes_read == 0 {
                break;
            }
            writer
                .write_all(&buffer[..bytes_read])
                .map_err(|e| CombineError::Io {
                    path: output.clone(),
                    source: e,
                })?;
            total += bytes_read as u64;
        }
        drop(reader);
        fs::remove_file(part).map_err(|e| CombineError::Io {
            path: part.clone(),
            source: e,
        })?;
    }

    writer.flush().map_err(|e| CombineError::Io {
        path: output.clone(),
        source: e,
    })?;

    debug!(path = %output.display(), parts = sorted.len(), bytes = total, "parts combined");
    Ok(CombinedFile {
        path: output,
        bytes: total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_parts(dir: &Path, base: &str, contents: &[&str]) -> Vec<PathBuf> {
        contents
            .iter()
            .enumerate()
            .map(|(i, content)| {
                let path = dir.join(format!("{}.{}", base, i + 1));
                fs::write(&path, content).unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn test_single_part_is_renamed() {
        let dir = TempDir::new().unwrap();
        let parts = write_parts(dir.path(), "x", &["only part"]);

        let combined = combine_files(&parts).unwrap();

        assert_eq!(combined.path, dir.path().join("x"));
        assert_eq!(combined.bytes, 9);
        assert_eq!(fs::read_to_string(&combined.path).unwrap(), "only part");
        assert!(!parts[0].exists());
    }

    #[test]
    fn test_shuffled_order_matches_sorted_order() {
        let sorted_dir = TempDir::new().unwrap();
        let sorted = write_parts(sorted_dir.path(), "x", &["a", "b"]);
        let from_sorted = combine_files(&sorted).unwrap();

        let shuffled_dir = TempDir::new().unwrap();
        let mut shuffled = write_parts(shuffled_dir.path(), "x", &["a", "b"]);
        shuffled.reverse();
        let from_shuffled = combine_files(&shuffled).unwrap();

        assert_eq!(from_sorted.bytes, from_shuffled.bytes);
        assert_eq!(
            fs::read(&from_sorted.path).unwrap(),
            fs::read(&from_shuffled.path).unwrap()
        );
        assert_eq!(fs::read_to_string(&from_shuffled.path).unwrap(), "ab");
    }

    #[test]
    fn test_numeric_not_lexical_order() {
        let dir = TempDir::new().unwrap();
        let contents: Vec<String> = (1..=11).map(|i| format!("{},", i)).collect();
        let refs: Vec<&str> = contents.iter().map(String::as_str).collect();
        let mut parts = write_parts(dir.path(), "big.log", &refs);
        parts.sort();

        let combined = combine_files(&parts).unwrap();

        assert_eq!(
            fs::read_to_string(&combined.path).unwrap(),
            "1,2,3,4,5,6,7,8,9,10,11,"
        );
        assert_eq!(combined.path, dir.path().join("big.log"));
        assert!(parts.iter().all(|p| !p.exists()));
    }

    #[test]
    fn test_sorting_error_reports_every_bad_suffix() {
        let parts = vec![
            PathBuf::from("x.abc"),
            PathBuf::from("x.1"),
            PathBuf::from("x.def"),
        ];
        let err = combine_files(&parts).unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, CombineError::Sorting { ref errors } if errors.len() == 2));
        assert!(message.contains("'abc'"));
        assert!(message.contains("'def'"));
    }

    #[test]
    fn test_invalid_suffix() {
        let err = combine_files(&[PathBuf::from("x.+1")]).unwrap_err();
        assert!(matches!(err, CombineError::InvalidSuffix { .. }));
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(combine_files(&[]), Err(CombineError::Empty)));
    }

    #[test]
    fn test_missing_part_is_io_error() {
        let dir = TempDir::new().unwrap();
        let mut parts = write_parts(dir.path(), "x", &["a"]);
        parts.push(dir.path().join("x.2"));
        let err = combine_files(&parts).unwrap_err();
        assert!(matches!(err, CombineError::Io { ref path, .. } if path.ends_with("x.2")));
    }
}

//! HTTP transport for encrypted segments and ticket attachments.
//!
//! The orchestrator only sees the [`SegmentDownloader`] trait so tests can
//! substitute a fake that serves canned payloads without network access.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::Client;
use thiserror::Error;
use tracing::debug;

/// Default timeout for a single segment download in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 300; // 5 minutes

/// Buffer size used when the caller supplies a value below 1 KB.
pub const DEFAULT_BUFFER_SIZE_KB: i64 = 4096;

/// Result type for downloads.
pub type DownloadResult<T> = Result<T, DownloadError>;

/// Errors that can occur while fetching a URL into a file.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The copy buffer was empty; the downloader was built incorrectly.
    #[error("buffer size was {buffer_size} bytes and cannot be smaller than 1 KB, build the downloader with HttpSegmentDownloader::new")]
    IllegalBufferSize { buffer_size: usize },

    /// Failed to build the HTTP client.
    #[error("unable to build HTTP client: {0}")]
    ClientBuild(String),

    /// The request could not be sent or the body could not be read.
    #[error("unable to retrieve url '{url}': {reason}")]
    RequestFailed { url: String, reason: String },

    /// The server answered with a non-success status.
    #[error("request to '{url}' failed with status {status}")]
    Status { url: String, status: u16 },

    /// Failed to create or write the destination file.
    #[error("unable to write to '{}': {source}", .path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Fetches a URL into a local file.
pub trait SegmentDownloader: Send + Sync {
    /// Download `url` into `dest`, creating or truncating it.
    ///
    /// Returns the number of bytes written.
    fn download(&self, dest: &Path, url: &str) -> DownloadResult<u64>;
}

/// Blocking HTTP downloader with a configurable copy buffer.
#[derive(Debug, Clone)]
pub struct HttpSegmentDownloader {
    client: Client,
    buffer_size: usize,
}

impl HttpSegmentDownloader {
    /// Create a downloader with the given buffer size in KB.
    ///
    /// Values below 1 fall back to [`DEFAULT_BUFFER_SIZE_KB`].
    pub fn new(buffer_size_kb: i64) -> DownloadResult<Self> {
        Self::with_timeout(buffer_size_kb, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a downloader with a custom request timeout.
    pub fn with_timeout(buffer_size_kb: i64, timeout: Duration) -> DownloadResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DownloadError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            buffer_size: buffer_size_bytes(buffer_size_kb),
        })
    }

    /// Size of the copy buffer in bytes.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}

impl SegmentDownloader for HttpSegmentDownloader {
    fn download(&self, dest: &Path, url: &str) -> DownloadResult<u64> {
        if self.buffer_size == 0 {
            return Err(DownloadError::IllegalBufferSize { buffer_size: 0 });
        }

        let mut response =
            self.client
                .get(url)
                .send()
                .map_err(|e| DownloadError::RequestFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let file = File::create(dest).map_err(|e| DownloadError::WriteFailed {
            path: dest.to_path_buf(),
            source: e,
        })?;
        let mut writer = BufWriter::new(file);
        let written = copy_with_buffer(&mut response, &mut writer, self.buffer_size, url, dest)?;
        writer.flush().map_err(|e| DownloadError::WriteFailed {
            path: dest.to_path_buf(),
            source: e,
        })?;

        debug!(url = %url, path = %dest.display(), bytes = written, "download complete");
        Ok(written)
    }
}

/// Convert a KB setting to bytes, applying the default for values below 1.
fn buffer_size_bytes(buffer_size_kb: i64) -> usize {
    let kb = if buffer_size_kb < 1 {
        debug!(
            requested = buffer_size_kb,
            default = DEFAULT_BUFFER_SIZE_KB,
            "buffer size cannot be smaller than 1 KB, using default"
        );
        DEFAULT_BUFFER_SIZE_KB
    } else {
        buffer_size_kb
    };
    usize::try_from(kb)
        .unwrap_or(usize::MAX / 1024)
        .saturating_mul(1024)
}

/// Stream `reader` into `writer` through a buffer of `buffer_size` bytes.
pub(crate) fn copy_with_buffer<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    buffer_size: usize,
    url: &str,
    dest: &Path,
) -> DownloadResult<u64> {
    if buffer_size == 0 {
        return Err(DownloadError::IllegalBufferSize { buffer_size });
    }

    let mut buffer = vec![0u8; buffer_size];
    let mut written = 0u64;
    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .map_err(|e| DownloadError::RequestFailed {
                url: url.to_string(),
                reason: format!("read error: {}", e),
            })?;
        if bytes_read == 0 {
            break;
        }
        writer
            .write_all(&buffer[..bytes_read])
            .map_err(|e| DownloadError::WriteFailed {
                path: dest.to_path_buf(),
                source: e,
            })?;
        written += bytes_read as u64;
    }
    Ok(written)
}

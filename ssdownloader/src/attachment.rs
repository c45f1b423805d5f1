//! Download of plain (unencrypted) ticket attachments.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use crate::downloader::{DownloadError, SegmentDownloader};
use crate::orchestrator::{file_size_check, is_plain_file_name};
use crate::reporting::Reporting;
use crate::zendesk::Attachment;

/// Timestamp prefix of the per-comment attachment directory.
const COMMENT_DIR_TIME_FORMAT: &str = "%Y-%m-%dT%H%M%SZ";

/// Result type for attachment downloads.
pub type AttachmentResult<T> = Result<T, AttachmentError>;

/// Errors downloading a single attachment.
#[derive(Debug, Error)]
pub enum AttachmentError {
    /// Zendesk marks the attachment as deleted.
    #[error("attachment '{file_name}' from comment {comment_id} created on {created_at} is marked as deleted, skipping")]
    Deleted {
        file_name: String,
        comment_id: i64,
        created_at: DateTime<Utc>,
    },

    /// The name would place the attachment outside its comment directory.
    #[error("attachment name '{file_name}' is not a plain file name")]
    UnsafeFileName { file_name: String },

    #[error("unable to create dir '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot download '{path}': {source}")]
    Download {
        path: PathBuf,
        #[source]
        source: DownloadError,
    },
}

/// `<download_dir>/tickets/<ticket_id>/attachments/<created_at>_<comment_id>`.
pub fn attachment_dir(download_dir: &Path, ticket_id: &str, attachment: &Attachment) -> PathBuf {
    download_dir
        .join("tickets")
        .join(ticket_id)
        .join("attachments")
        .join(format!(
            "{}_{}",
            attachment.parent_comment_date.format(COMMENT_DIR_TIME_FORMAT),
            attachment.parent_comment_id
        ))
}

/// Download one attachment unless it is already on disk.
///
/// Returns the paths whose size does not match what Zendesk reported.
pub fn download_attachment(
    downloader: &dyn SegmentDownloader,
    reporting: &Reporting,
    attachment: &Attachment,
    download_dir: &Path,
    ticket_id: &str,
) -> AttachmentResult<Vec<PathBuf>> {
    reporting.add_file();
    if attachment.deleted {
        reporting.add_failed();
        return Err(AttachmentError::Deleted {
            file_name: attachment.file_name.clone(),
            comment_id: attachment.parent_comment_id,
            created_at: attachment.parent_comment_date,
        });
    }

    if !is_plain_file_name(&attachment.file_name) {
        reporting.add_failed();
        return Err(AttachmentError::UnsafeFileName {
            file_name: attachment.file_name.clone(),
        });
    }

    let dir = attachment_dir(download_dir, ticket_id, attachment);
    let path = dir.join(&attachment.file_name);
    let mut invalid_files = Vec::new();

    if path.exists() {
        if !file_size_check(&path, attachment.size).unwrap_or(false) {
            invalid_files.push(path.clone());
        }
        reporting.add_skip();
        debug!(file_name = %path.display(), "attachment already downloaded, skipping");
        return Ok(invalid_files);
    }

    if let Err(e) = fs::create_dir_all(&dir) {
        reporting.add_failed();
        return Err(AttachmentError::CreateDir {
            path: dir,
            source: e,
        });
    }

    debug!(file_name = %path.display(), "downloading attachment");
    let bytes = match downloader.download(&path, &attachment.content_url) {
        Ok(bytes) => bytes,
        Err(e) => {
            reporting.add_failed();
            return Err(AttachmentError::Download { path, source: e });
        }
    };

    if !file_size_check(&path, attachment.size).unwrap_or(false) {
        invalid_files.push(path.clone());
    }
    debug!(file_name = %path.display(), bytes, "attachment download complete");
    reporting.add_bytes(bytes);
    Ok(invalid_files)
}

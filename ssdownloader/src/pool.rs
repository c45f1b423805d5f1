//! Bounded concurrency for ticket downloads.
//!
//! A ticket fans out into independent units: one per SendSafely package
//! link and one per plain attachment. Units run on a fixed-size
//! [`WorkerPool`]; the submitting thread blocks until all of them finish.
//! Segments within a package are still fetched sequentially by the unit
//! that owns the package.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::attachment::download_attachment;
use crate::decrypt::PartDecryptor;
use crate::downloader::SegmentDownloader;
use crate::link::{parse_link, LinkParts};
use crate::orchestrator::{DownloadArgs, PackageDownloader};
use crate::reporting::Reporting;
use crate::sendsafely::PackageClient;
use crate::zendesk::{Attachment, CommentLink, TicketContents};

/// Links with this prefix are treated as SendSafely packages.
pub const SENDSAFELY_LINK_PREFIX: &str = "https://sendsafely";

/// Default number of workers.
pub const DEFAULT_THREADS: usize = 8;

/// Name of the file holding the comment a package link came from.
pub const COMMENT_FILE_NAME: &str = "comment.txt";

/// Result type for pool setup.
pub type PoolResult<T> = Result<T, PoolError>;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("thread count must be at least 1, got {threads}")]
    InvalidThreads { threads: usize },

    #[error("cannot initialize thread pool: {0}")]
    Build(#[from] rayon::ThreadPoolBuildError),
}

/// One submitted piece of work.
pub type Unit<'s> = Box<dyn FnOnce() + Send + 's>;

/// Fixed-size pool with a join barrier.
pub struct WorkerPool {
    pool: ThreadPool,
    threads: usize,
}

impl WorkerPool {
    pub fn new(threads: usize) -> PoolResult<Self> {
        if threads == 0 {
            return Err(PoolError::InvalidThreads { threads });
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("ssdownloader-worker-{}", i))
            .build()?;
        Ok(Self { pool, threads })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Run every unit and return once all of them have completed.
    pub fn run_all<'s>(&self, units: Vec<Unit<'s>>) {
        let count = units.len();
        self.pool.scope(move |scope| {
            for unit in units {
                scope.spawn(move |_| unit());
            }
        });
        debug!(units = count, "all units complete");
    }
}

/// Downloads everything referenced by one ticket.
pub struct TicketJob<'a> {
    client: &'a dyn PackageClient,
    downloader: &'a dyn SegmentDownloader,
    reporting: Arc<Reporting>,
    download_dir: PathBuf,
    ticket_id: String,
    max_file_size_bytes: u64,
    sendsafely_only: bool,
    decryptor: PartDecryptor,
}

impl<'a> TicketJob<'a> {
    pub fn new(
        client: &'a dyn PackageClient,
        downloader: &'a dyn SegmentDownloader,
        reporting: Arc<Reporting>,
        download_dir: impl Into<PathBuf>,
        ticket_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            downloader,
            reporting,
            download_dir: download_dir.into(),
            ticket_id: ticket_id.into(),
            max_file_size_bytes: u64::MAX,
            sendsafely_only: false,
            decryptor: PartDecryptor::new(),
        }
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size_bytes = bytes;
        self
    }

    /// Ignore plain attachments.
    pub fn with_sendsafely_only(mut self, sendsafely_only: bool) -> Self {
        self.sendsafely_only = sendsafely_only;
        self
    }

    pub fn with_decryptor(mut self, decryptor: PartDecryptor) -> Self {
        self.decryptor = decryptor;
        self
    }

    /// Package links that will be submitted as units.
    ///
    /// Links that look like SendSafely but do not parse are left out;
    /// [`TicketJob::run`] logs them.
    pub fn package_links<'c>(
        &self,
        contents: &'c TicketContents,
    ) -> Vec<(&'c CommentLink, LinkParts)> {
        sendsafely_links(contents)
            .filter_map(|link| parse_link(&link.url).ok().map(|parts| (link, parts)))
            .collect()
    }

    /// Attachments that will be submitted as units.
    pub fn attachments<'c>(&self, contents: &'c TicketContents) -> &'c [Attachment] {
        if self.sendsafely_only {
            &[]
        } else {
            &contents.attachments
        }
    }

    /// Number of units [`TicketJob::run`] will submit.
    pub fn unit_count(&self, contents: &TicketContents) -> usize {
        self.package_links(contents).len() + self.attachments(contents).len()
    }

    /// Run every unit on `pool` and return the merged invalid files.
    ///
    /// `progress` is called once per finished unit, from the worker thread.
    pub fn run(
        &self,
        pool: &WorkerPool,
        contents: &TicketContents,
        progress: &(dyn Fn() + Sync),
    ) -> Vec<PathBuf> {
        let invalid_files = Mutex::new(Vec::new());
        let invalid = &invalid_files;
        let mut units: Vec<Unit<'_>> = Vec::new();

        for link in sendsafely_links(contents) {
            let parts = match parse_link(&link.url) {
                Ok(parts) => parts,
                Err(e) => {
                    error!(url = %link.url, error = %e, "unexpected error reading url, skipping");
                    continue;
                }
            };
            units.push(Box::new(move || {
                self.run_package(link, &parts, invalid);
                progress();
            }));
        }
        for attachment in self.attachments(contents) {
            units.push(Box::new(move || {
                self.run_attachment(attachment, invalid);
                progress();
            }));
        }

        debug!(ticket_id = %self.ticket_id, units = units.len(), "submitting ticket units");
        pool.run_all(units);
        invalid_files.into_inner()
    }

    fn run_package(
        &self,
        link: &CommentLink,
        parts: &LinkParts,
        invalid: &Mutex<Vec<PathBuf>>,
    ) {
        let args = DownloadArgs::new(&self.download_dir, &parts.package_code, &parts.key_code)
            .with_sub_dir(PathBuf::from("tickets").join(&self.ticket_id))
            .with_max_file_size(self.max_file_size_bytes);
        let downloader = PackageDownloader::new(self.client, self.downloader, Arc::clone(&self.reporting))
            .with_decryptor(self.decryptor.clone());

        match downloader.download_package(&args) {
            Ok(outcome) => {
                invalid.lock().extend(outcome.invalid_files);
                let comment_file = outcome.out_dir.join(COMMENT_FILE_NAME);
                if let Err(e) = fs::write(&comment_file, &link.body) {
                    error!(output_file = %comment_file.display(), error = %e, "error writing comment text");
                }
            }
            Err(e) => {
                error!(package_id = %parts.package_code, error = %e, "error downloading files from package");
            }
        }
    }

    fn run_attachment(&self, attachment: &Attachment, invalid: &Mutex<Vec<PathBuf>>) {
        match download_attachment(
            self.downloader,
            &self.reporting,
            attachment,
            &self.download_dir,
            &self.ticket_id,
        ) {
            Ok(files) => invalid.lock().extend(files),
            Err(e) => {
                warn!(attachment = %attachment.file_name, error = %e, "error processing attachment, skipping")
            }
        }
    }
}

fn sendsafely_links(contents: &TicketContents) -> impl Iterator<Item = &CommentLink> {
    contents
        .links
        .iter()
        .filter(|link| link.url.starts_with(SENDSAFELY_LINK_PREFIX))
}

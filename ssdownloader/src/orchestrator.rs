//! Per-package download pipeline.
//!
//! For one package: fetch metadata, create the output directory, then for
//! each file decide between skipping and downloading. A download plans the
//! segment batches, fetches every segment, decrypts it, and combines the
//! plaintext parts into the final file. Failures are isolated per file;
//! only a metadata (or output directory) failure stops the whole package.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::combiner::combine_files;
use crate::decrypt::{PartDecryptor, ENCRYPTED_SUFFIX};
use crate::downloader::SegmentDownloader;
use crate::planner::plan;
use crate::reporting::{human, Reporting};
use crate::sendsafely::{ApiError, Package, PackageClient, PackageFile};

/// Timestamp prefix of the package output directory.
const PACKAGE_DIR_TIME_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Result type for package downloads.
pub type PackageResult<T> = Result<T, PackageError>;

/// Errors that stop a whole package.
#[derive(Debug, Error)]
pub enum PackageError {
    /// Package metadata could not be retrieved.
    #[error("unable to retrieve package {package_id}: {source}")]
    Metadata {
        package_id: String,
        #[source]
        source: ApiError,
    },

    /// The package output directory could not be created.
    #[error("unable to create download dir '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// What to download and where.
#[derive(Clone)]
pub struct DownloadArgs {
    pub download_dir: PathBuf,
    pub package_id: String,
    pub key_code: String,
    /// Directory under `download_dir` that holds the package directory.
    pub sub_dir: PathBuf,
    /// Files reported larger than this are skipped.
    pub max_file_size_bytes: u64,
    /// File ids that are never downloaded.
    pub skip_list: Vec<String>,
}

impl std::fmt::Debug for DownloadArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadArgs")
            .field("download_dir", &self.download_dir)
            .field("package_id", &self.package_id)
            .field("key_code", &"<redacted>")
            .field("sub_dir", &self.sub_dir)
            .field("max_file_size_bytes", &self.max_file_size_bytes)
            .field("skip_list", &self.skip_list)
            .finish()
    }
}

impl DownloadArgs {
    /// Download everything in the package directly under `download_dir`.
    pub fn new(
        download_dir: impl Into<PathBuf>,
        package_id: impl Into<String>,
        key_code: impl Into<String>,
    ) -> Self {
        Self {
            download_dir: download_dir.into(),
            package_id: package_id.into(),
            key_code: key_code.into(),
            sub_dir: PathBuf::new(),
            max_file_size_bytes: u64::MAX,
            skip_list: Vec::new(),
        }
    }

    pub fn with_sub_dir(mut self, sub_dir: impl Into<PathBuf>) -> Self {
        self.sub_dir = sub_dir.into();
        self
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size_bytes = bytes;
        self
    }

    pub fn with_skip_list(mut self, file_ids: Vec<String>) -> Self {
        self.skip_list = file_ids;
        self
    }
}

/// Result of processing one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub out_dir: PathBuf,
    /// Files whose on-disk size differs from the reported size.
    pub invalid_files: Vec<PathBuf>,
}

/// How a single file ended up.
#[derive(Debug)]
enum FileOutcome {
    Skipped,
    AlreadyPresent { size_matches: bool },
    Failed,
    Downloaded { bytes: u64, size_matches: bool },
}

/// Runs the package pipeline against injected collaborators.
pub struct PackageDownloader<'a> {
    client: &'a dyn PackageClient,
    downloader: &'a dyn SegmentDownloader,
    reporting: Arc<Reporting>,
    decryptor: PartDecryptor,
}

impl<'a> PackageDownloader<'a> {
    pub fn new(
        client: &'a dyn PackageClient,
        downloader: &'a dyn SegmentDownloader,
        reporting: Arc<Reporting>,
    ) -> Self {
        Self {
            client,
            downloader,
            reporting,
            decryptor: PartDecryptor::new(),
        }
    }

    /// Use a specific decryptor (e.g. one with a fixed clock).
    pub fn with_decryptor(mut self, decryptor: PartDecryptor) -> Self {
        self.decryptor = decryptor;
        self
    }

    /// Download every eligible file of one package.
    pub fn download_package(&self, args: &DownloadArgs) -> PackageResult<DownloadOutcome> {
        let package = self
            .client
            .retrieve_package(&args.package_id)
            .map_err(|e| PackageError::Metadata {
                package_id: args.package_id.clone(),
                source: e,
            })?;

        let out_dir = package_dir(&args.download_dir, &args.sub_dir, &package);
        if !out_dir.exists() {
            debug!(dir = %out_dir.display(), "creating package directory");
            fs::create_dir_all(&out_dir).map_err(|e| PackageError::CreateDir {
                path: out_dir.clone(),
                source: e,
            })?;
        }

        let mut invalid_files = Vec::new();
        for file in &package.files {
            self.reporting.add_file();
            if !is_plain_file_name(&file.file_name) {
                error!(
                    file_id = %file.file_id,
                    file_name = %file.file_name,
                    "file name is not a plain file name, not downloading"
                );
                self.reporting.add_failed();
                continue;
            }
            let full_path = out_dir.join(&file.file_name);

            match self.process_file(&package, file, &full_path, args) {
                FileOutcome::Skipped => self.reporting.add_skip(),
                FileOutcome::AlreadyPresent { size_matches } => {
                    if !size_matches {
                        invalid_files.push(full_path);
                    }
                    self.reporting.add_skip();
                }
                FileOutcome::Failed => self.reporting.add_failed(),
                FileOutcome::Downloaded {
                    bytes,
                    size_matches,
                } => {
                    if !size_matches {
                        invalid_files.push(full_path);
                    }
                    self.reporting.add_bytes(bytes);
                }
            }
        }

        info!(
            package_id = %package.package_id,
            dir = %out_dir.display(),
            files = package.files.len(),
            invalid = invalid_files.len(),
            "package complete"
        );
        Ok(DownloadOutcome {
            out_dir,
            invalid_files,
        })
    }

    fn process_file(
        &self,
        package: &Package,
        file: &PackageFile,
        full_path: &Path,
        args: &DownloadArgs,
    ) -> FileOutcome {
        if args.skip_list.iter().any(|id| *id == file.file_id) {
            debug!(file_id = %file.file_id, file_name = %file.file_name, "file in skip list");
            return FileOutcome::Skipped;
        }
        if file.file_size > args.max_file_size_bytes {
            info!(
                file_name = %file.file_name,
                file_size = %human(file.file_size),
                limit = %human(args.max_file_size_bytes),
                "file exceeds max file size, skipping"
            );
            return FileOutcome::Skipped;
        }

        if full_path.exists() {
            debug!(file_name = %full_path.display(), "file already downloaded, skipping");
            return match file_size_check(full_path, file.file_size) {
                Ok(size_matches) => FileOutcome::AlreadyPresent { size_matches },
                Err(e) => {
                    error!(file_name = %full_path.display(), error = %e, "unable to check file size");
                    FileOutcome::AlreadyPresent {
                        size_matches: false,
                    }
                }
            };
        }

        debug!(
            file_name = %file.file_name,
            parts = file.parts,
            file_size = file.file_size,
            "downloading file"
        );
        let decrypted = match self.fetch_parts(package, file, full_path, &args.key_code) {
            Some(parts) => parts,
            None => return FileOutcome::Failed,
        };

        let combined = match combine_files(&decrypted) {
            Ok(combined) => combined,
            Err(e) => {
                error!(file_name = %file.file_name, error = %e, "unable to combine parts");
                return FileOutcome::Failed;
            }
        };

        let size_matches = match file_size_check(&combined.path, file.file_size) {
            Ok(matches) => matches,
            Err(e) => {
                error!(file_name = %combined.path.display(), error = %e, "unable to check file size");
                false
            }
        };
        debug!(
            file_name = %combined.path.display(),
            file_size = %human(combined.bytes),
            file_size_bytes = combined.bytes,
            "file complete"
        );
        FileOutcome::Downloaded {
            bytes: combined.bytes,
            size_matches,
        }
    }

    /// Download and decrypt every segment of `file`.
    ///
    /// Returns `None` if any segment failed; sibling segments are still
    /// attempted so the logs show every failure at once. Decrypted siblings
    /// of a failed file are removed, failed `.encrypted` segments are kept.
    fn fetch_parts(
        &self,
        package: &Package,
        file: &PackageFile,
        full_path: &Path,
        key_code: &str,
    ) -> Option<Vec<PathBuf>> {
        let mut decrypted = Vec::with_capacity(file.parts as usize);
        let mut failed_parts = Vec::new();

        for batch in plan(file.parts) {
            let urls = match self.client.get_download_urls(
                package,
                &file.file_id,
                key_code,
                batch.start_segment,
                batch.end_segment,
            ) {
                Ok(urls) => urls,
                Err(e) => {
                    error!(
                        file_name = %file.file_name,
                        start_segment = batch.start_segment,
                        end_segment = batch.end_segment,
                        error = %e,
                        "unable to get download urls"
                    );
                    discard_parts(&decrypted);
                    return None;
                }
            };

            for url in urls {
                let encrypted = segment_path(full_path, url.part);
                if let Err(e) = self.downloader.download(&encrypted, &url.url) {
                    warn!(file_name = %file.file_name, part = url.part, error = %e, "segment download failed");
                    failed_parts.push(url.part);
                    continue;
                }
                match self
                    .decryptor
                    .decrypt_part(&encrypted, &package.server_secret, key_code)
                {
                    Ok(path) => decrypted.push(path),
                    Err(e) => {
                        warn!(file_name = %file.file_name, part = url.part, error = %e, "segment decrypt failed");
                        failed_parts.push(url.part);
                    }
                }
            }
        }

        if !failed_parts.is_empty() {
            error!(
                file_name = %file.file_name,
                failed_parts = ?failed_parts,
                "parts failed, file not combined"
            );
            discard_parts(&decrypted);
            return None;
        }
        if decrypted.len() != file.parts as usize {
            error!(
                file_name = %file.file_name,
                expected = file.parts,
                received = decrypted.len(),
                "service returned fewer segments than reported"
            );
            discard_parts(&decrypted);
            return None;
        }
        Some(decrypted)
    }
}

/// Remove decrypted parts of a file that will not be combined.
fn discard_parts(parts: &[PathBuf]) {
    for part in parts {
        if let Err(e) = fs::remove_file(part) {
            warn!(file_name = %part.display(), error = %e, "unable to remove decrypted part");
        }
    }
}

/// True if `name` is a single normal path component.
///
/// Names from the service or from Zendesk are joined onto the output
/// directory; an absolute name or one with `..` or a separator would land
/// outside it.
pub fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// `<download_dir>/<sub_dir>/<timestamp>_<package_id>`.
pub fn package_dir(download_dir: &Path, sub_dir: &Path, package: &Package) -> PathBuf {
    download_dir.join(sub_dir).join(format!(
        "{}_{}",
        package.package_timestamp.format(PACKAGE_DIR_TIME_FORMAT),
        package.package_id
    ))
}

/// Temporary name of a downloaded, still encrypted segment.
fn segment_path(full_path: &Path, part: u32) -> PathBuf {
    let mut name = full_path.as_os_str().to_os_string();
    name.push(format!(".{}{}", part, ENCRYPTED_SUFFIX));
    PathBuf::from(name)
}

/// Compare a file's size on disk against the size the service reported.
///
/// A mismatch is only logged: reported sizes are known to drift from the
/// real content, and such files have so far always been usable.
pub fn file_size_check(path: &Path, expected: u64) -> io::Result<bool> {
    let actual = fs::metadata(path)?.len();
    if actual != expected {
        warn!(
            file_name = %path.display(),
            current_file_size_bytes = actual,
            reported_file_size_bytes = expected,
            "file size on disk does not match reported size"
        );
        return Ok(false);
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{file, package, FakeClient, FakeDownloader, KEY_CODE};
    use std::collections::{HashMap, HashSet};
    use tempfile::TempDir;

    fn run(
        client: &FakeClient,
        downloader: &FakeDownloader,
        args: &DownloadArgs,
    ) -> (PackageResult<DownloadOutcome>, Arc<Reporting>) {
        let reporting = Arc::new(Reporting::new());
        let result =
            PackageDownloader::new(client, downloader, Arc::clone(&reporting)).download_package(args);
        (result, reporting)
    }

    #[test]
    fn test_package_dir_name() {
        let dir = package_dir(Path::new("/dl"), Path::new("packages"), &package(vec![]));
        assert_eq!(dir, PathBuf::from("/dl/packages/20190201T140728_ABDC-DDFAF"));
    }

    #[test]
    fn test_segment_path() {
        assert_eq!(
            segment_path(Path::new("/out/report.txt"), 12),
            PathBuf::from("/out/report.txt.12.encrypted")
        );
    }

    #[test]
    fn test_multi_batch_file_is_combined_in_order() {
        let temp = TempDir::new().unwrap();
        let expected: String = (1..=30).map(|p| format!("{},", p)).collect();
        let client = FakeClient::new(package(vec![file(
            "f1",
            "big.log",
            expected.len() as u64,
            30,
        )]));
        let downloader = FakeDownloader::default();
        let args = DownloadArgs::new(temp.path(), "ABDC-DDFAF", KEY_CODE);

        let (result, reporting) = run(&client, &downloader, &args);
        let outcome = result.unwrap();

        let combined = outcome.out_dir.join("big.log");
        assert_eq!(fs::read_to_string(&combined).unwrap(), expected);
        assert!(outcome.invalid_files.is_empty());
        assert_eq!(
            *client.url_calls.lock(),
            vec![("f1".to_string(), 1, 25), ("f1".to_string(), 26, 30)]
        );
        let snapshot = reporting.snapshot();
        assert_eq!(snapshot.total_files, 1);
        assert_eq!(snapshot.total_succeeded(), 1);
        assert_eq!(snapshot.total_bytes, expected.len() as u64);

        let leftovers: Vec<_> = fs::read_dir(&outcome.out_dir).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_failed_segment_isolates_file() {
        let temp = TempDir::new().unwrap();
        let client = FakeClient::new(package(vec![
            file("bad", "bad.txt", 4, 2),
            file("good", "good.txt", 2, 1),
        ]));
        let downloader = FakeDownloader {
            failing: HashSet::from(["fake://bad/1".to_string()]),
            ..Default::default()
        };
        let args = DownloadArgs::new(temp.path(), "ABDC-DDFAF", KEY_CODE);

        let (result, reporting) = run(&client, &downloader, &args);
        let outcome = result.unwrap();

        assert!(!outcome.out_dir.join("bad.txt").exists());
        assert_eq!(fs::read_to_string(outcome.out_dir.join("good.txt")).unwrap(), "1,");
        // sibling segment of the failed one was still fetched
        assert!(downloader.calls.lock().contains(&"fake://bad/2".to_string()));
        let snapshot = reporting.snapshot();
        assert_eq!(snapshot.total_files, 2);
        assert_eq!(snapshot.total_failed, 1);
        assert_eq!(snapshot.total_succeeded(), 1);
    }

    #[test]
    fn test_failed_file_leaves_no_decrypted_parts() {
        let temp = TempDir::new().unwrap();
        let client = FakeClient::new(package(vec![file("bad", "bad.txt", 6, 3)]));
        let downloader = FakeDownloader {
            failing: HashSet::from(["fake://bad/2".to_string()]),
            ..Default::default()
        };
        let args = DownloadArgs::new(temp.path(), "ABDC-DDFAF", KEY_CODE);

        let (result, _) = run(&client, &downloader, &args);
        let outcome = result.unwrap();

        assert!(!outcome.out_dir.join("bad.txt.1").exists());
        assert!(!outcome.out_dir.join("bad.txt.3").exists());
        assert!(fs::read_dir(&outcome.out_dir).unwrap().next().is_none());
    }

    #[test]
    fn test_plain_file_name() {
        assert!(is_plain_file_name("report.txt"));
        assert!(is_plain_file_name("..hidden"));
        assert!(!is_plain_file_name(""));
        assert!(!is_plain_file_name("/tmp/evil.txt"));
        assert!(!is_plain_file_name("../evil.txt"));
        assert!(!is_plain_file_name(".."));
        assert!(!is_plain_file_name("logs/evil.txt"));
    }

    #[test]
    fn test_file_names_outside_package_dir_are_refused() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("outside")).unwrap();
        let target = temp.path().join("outside").join("evil.txt");
        let client = FakeClient::new(package(vec![
            file("abs", target.to_str().unwrap(), 2, 1),
            file("up", "../evil.txt", 2, 1),
            file("ok", "fine.txt", 2, 1),
        ]));
        let downloader = FakeDownloader::default();
        let args = DownloadArgs::new(temp.path(), "ABDC-DDFAF", KEY_CODE).with_sub_dir("packages");

        let (result, reporting) = run(&client, &downloader, &args);
        let outcome = result.unwrap();

        assert!(!target.exists());
        assert!(!temp.path().join("packages").join("evil.txt").exists());
        assert_eq!(fs::read_to_string(outcome.out_dir.join("fine.txt")).unwrap(), "1,");
        assert_eq!(*downloader.calls.lock(), vec!["fake://ok/1".to_string()]);
        let snapshot = reporting.snapshot();
        assert_eq!(snapshot.total_files, 3);
        assert_eq!(snapshot.total_failed, 2);
        assert_eq!(snapshot.total_succeeded(), 1);
    }

    #[test]
    fn test_undecryptable_segment_is_left_for_diagnosis() {
        let temp = TempDir::new().unwrap();
        let client = FakeClient::new(package(vec![file("f1", "a.txt", 2, 1)]));
        let downloader = FakeDownloader {
            corrupt: HashMap::from([("fake://f1/1".to_string(), vec![0xC3, 0x01, 0x00])]),
            ..Default::default()
        };
        let args = DownloadArgs::new(temp.path(), "ABDC-DDFAF", KEY_CODE);

        let (result, reporting) = run(&client, &downloader, &args);
        let outcome = result.unwrap();

        assert!(outcome.out_dir.join("a.txt.1.encrypted").exists());
        assert!(!outcome.out_dir.join("a.txt").exists());
        assert_eq!(reporting.total_failed(), 1);
    }

    #[test]
    fn test_existing_file_with_wrong_size_is_invalid_and_skipped() {
        let temp = TempDir::new().unwrap();
        let pkg = package(vec![file("f1", "a.txt", 100, 1)]);
        let out_dir = package_dir(temp.path(), Path::new(""), &pkg);
        fs::create_dir_all(&out_dir).unwrap();
        fs::write(out_dir.join("a.txt"), "short").unwrap();
        let client = FakeClient::new(pkg);
        let downloader = FakeDownloader::default();
        let args = DownloadArgs::new(temp.path(), "ABDC-DDFAF", KEY_CODE);

        let (result, reporting) = run(&client, &downloader, &args);
        let outcome = result.unwrap();

        assert_eq!(outcome.invalid_files, vec![out_dir.join("a.txt")]);
        assert!(downloader.calls.lock().is_empty());
        assert_eq!(reporting.total_skipped(), 1);
    }

    #[test]
    fn test_size_mismatch_after_combine_is_not_fatal() {
        let temp = TempDir::new().unwrap();
        let client = FakeClient::new(package(vec![file("f1", "a.txt", 9999, 1)]));
        let downloader = FakeDownloader::default();
        let args = DownloadArgs::new(temp.path(), "ABDC-DDFAF", KEY_CODE);

        let (result, reporting) = run(&client, &downloader, &args);
        let outcome = result.unwrap();

        assert!(outcome.out_dir.join("a.txt").exists());
        assert_eq!(outcome.invalid_files, vec![outcome.out_dir.join("a.txt")]);
        assert_eq!(reporting.total_failed(), 0);
        assert_eq!(reporting.total_bytes(), 2);
    }

    #[test]
    fn test_metadata_failure_is_terminal() {
        let temp = TempDir::new().unwrap();
        let client = FakeClient::with_packages(vec![]);
        let downloader = FakeDownloader::default();
        let args = DownloadArgs::new(temp.path(), "GONE-1234", KEY_CODE);

        let (result, reporting) = run(&client, &downloader, &args);

        let err = result.unwrap_err();
        assert!(matches!(err, PackageError::Metadata { .. }));
        assert!(err.to_string().contains("likely expired"));
        assert_eq!(reporting.total_files(), 0);
    }

    #[test]
    fn test_debug_redacts_key_code() {
        let args = DownloadArgs::new("/dl", "ABDC-DDFAF", KEY_CODE);
        assert!(!format!("{:?}", args).contains(KEY_CODE));
    }
}

//! Scripted collaborators shared by unit tests.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;

use crate::decrypt::PartEncryptor;
use crate::downloader::{DownloadError, DownloadResult, SegmentDownloader};
use crate::sendsafely::{ApiError, ApiResult, DownloadUrl, Package, PackageClient, PackageFile};

pub const SECRET: &str = "ACbuj9NKTkvjZ71Gc0t5zuU1xvba9XAouA";
pub const KEY_CODE: &str = "MYKEYCODE";

pub fn package(files: Vec<PackageFile>) -> Package {
    package_with_id("ABDC-DDFAF", files)
}

pub fn package_with_id(package_id: &str, files: Vec<PackageFile>) -> Package {
    Package {
        package_id: package_id.to_string(),
        package_code: "code".to_string(),
        server_secret: SECRET.to_string(),
        files,
        directory_ids: vec![],
        state: "PACKAGE_STATE_IN_PROGRESS".to_string(),
        package_timestamp: Utc.with_ymd_and_hms(2019, 2, 1, 14, 7, 28).unwrap(),
        response: "SUCCESS".to_string(),
    }
}

pub fn file(id: &str, name: &str, size: u64, parts: u32) -> PackageFile {
    PackageFile {
        file_id: id.to_string(),
        file_name: name.to_string(),
        file_size: size,
        parts,
        uploaded_at: Utc.with_ymd_and_hms(2022, 2, 9, 23, 14, 24).unwrap(),
        version: "1".to_string(),
        created_by_email: "test@tester.com".to_string(),
    }
}

/// Serves fixed packages by id; urls are `fake://<file_id>/<part>`.
pub struct FakeClient {
    pub packages: HashMap<String, Package>,
    pub url_calls: Mutex<Vec<(String, u32, u32)>>,
}

impl FakeClient {
    pub fn new(package: Package) -> Self {
        Self::with_packages(vec![package])
    }

    pub fn with_packages(packages: Vec<Package>) -> Self {
        Self {
            packages: packages
                .into_iter()
                .map(|p| (p.package_id.clone(), p))
                .collect(),
            url_calls: Mutex::new(Vec::new()),
        }
    }
}

impl PackageClient for FakeClient {
    fn retrieve_package(&self, package_id: &str) -> ApiResult<Package> {
        self.packages
            .get(package_id)
            .cloned()
            .ok_or_else(|| ApiError::PackageNotFound {
                package_id: package_id.to_string(),
            })
    }

    fn get_download_urls(
        &self,
        _package: &Package,
        file_id: &str,
        _key_code: &str,
        start: u32,
        end: u32,
    ) -> ApiResult<Vec<DownloadUrl>> {
        self.url_calls.lock().push((file_id.to_string(), start, end));
        Ok((start..=end)
            .map(|part| DownloadUrl {
                part,
                url: format!("fake://{}/{}", file_id, part),
            })
            .collect())
    }
}

/// Writes an encrypted segment whose plaintext is `"<part>,"`.
///
/// Urls outside `fake://` are served as plain bytes from `plain`.
#[derive(Default)]
pub struct FakeDownloader {
    pub failing: HashSet<String>,
    pub corrupt: HashMap<String, Vec<u8>>,
    pub plain: HashMap<String, String>,
    pub calls: Mutex<Vec<String>>,
}

impl SegmentDownloader for FakeDownloader {
    fn download(&self, dest: &Path, url: &str) -> DownloadResult<u64> {
        self.calls.lock().push(url.to_string());
        if self.failing.contains(url) {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: 403,
            });
        }
        let payload = if let Some(bytes) = self.corrupt.get(url) {
            bytes.clone()
        } else if let Some(content) = self.plain.get(url) {
            content.as_bytes().to_vec()
        } else {
            let part = url.rsplit('/').next().unwrap_or("0");
            PartEncryptor::new()
                .encrypt_part(format!("{},", part).as_bytes(), SECRET, KEY_CODE, "seg")
                .unwrap()
        };
        fs::write(dest, &payload).unwrap();
        Ok(payload.len() as u64)
    }
}

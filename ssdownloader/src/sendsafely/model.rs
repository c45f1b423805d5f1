//! Response model for the package and download-urls endpoints.
//!
//! Responses are deserialized into permissive raw structs first so that a
//! missing field can be reported by name instead of as a generic serde
//! error.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::error::{ApiError, ApiResult};

/// Format of `packageTimestamp` and `fileUploaded`, e.g. `Feb 1, 2019 2:07:28 PM`.
pub const SERVER_DATE_FORMAT: &str = "%b %d, %Y %I:%M:%S %p";

const RESPONSE_SUCCESS: &str = "SUCCESS";
const RESPONSE_UNKNOWN_PACKAGE: &str = "UNKNOWN_PACKAGE";
const RESPONSE_AUTHENTICATION_FAILED: &str = "AUTHENTICATION_FAILED";

/// Server-side snapshot of one package.
#[derive(Clone, PartialEq, Eq)]
pub struct Package {
    pub package_id: String,
    pub package_code: String,
    /// Combined with the link key code to form the decryption passphrase.
    pub server_secret: String,
    pub files: Vec<PackageFile>,
    pub directory_ids: Vec<String>,
    pub state: String,
    pub package_timestamp: DateTime<Utc>,
    pub response: String,
}

impl std::fmt::Debug for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Package")
            .field("package_id", &self.package_id)
            .field("package_code", &self.package_code)
            .field("server_secret", &"<redacted>")
            .field("files", &self.files)
            .field("directory_ids", &self.directory_ids)
            .field("state", &self.state)
            .field("package_timestamp", &self.package_timestamp)
            .field("response", &self.response)
            .finish()
    }
}

/// One logical file inside a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFile {
    pub file_id: String,
    pub file_name: String,
    /// Size reported by the service. Occasionally wrong.
    pub file_size: u64,
    /// Number of encrypted segments the file is split into.
    pub parts: u32,
    pub uploaded_at: DateTime<Utc>,
    pub version: String,
    pub created_by_email: String,
}

/// Pre-signed URL for exactly one segment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DownloadUrl {
    pub part: u32,
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPackage {
    package_id: Option<String>,
    package_code: Option<String>,
    server_secret: Option<String>,
    #[serde(default)]
    files: Vec<RawFile>,
    #[serde(default)]
    directories: Vec<RawDirectory>,
    state: Option<String>,
    package_timestamp: Option<String>,
    response: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFile {
    file_id: Option<String>,
    file_name: Option<String>,
    file_size: Option<Value>,
    parts: Option<u32>,
    file_uploaded: Option<String>,
    created_by_email: Option<String>,
    file_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDirectory {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDownloadUrls {
    response: Option<String>,
    message: Option<String>,
    #[serde(default)]
    download_urls: Vec<DownloadUrl>,
}

fn require<T>(value: Option<T>, field: &str, context: &str) -> ApiResult<T> {
    value.ok_or_else(|| ApiError::MissingField {
        field: field.to_string(),
        context: context.to_string(),
    })
}

fn parse_server_date(raw: &str, field: &str, context: &str) -> ApiResult<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, SERVER_DATE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| ApiError::InvalidField {
            field: field.to_string(),
            value: raw.to_string(),
            context: context.to_string(),
            reason: e.to_string(),
        })
}

/// `fileSize` arrives as a numeric string; accept a bare number too.
fn parse_file_size(raw: Value, context: &str) -> ApiResult<u64> {
    let parsed = match &raw {
        Value::String(s) => s.trim().parse::<u64>().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    };
    parsed.ok_or_else(|| ApiError::InvalidField {
        field: "fileSize".to_string(),
        value: raw.to_string(),
        context: context.to_string(),
        reason: "not a non-negative integer".to_string(),
    })
}

/// Parse a package response body.
///
/// `requested_id` is the ID the caller asked for and is only used for
/// error messages.
pub fn parse_package(requested_id: &str, body: &str) -> ApiResult<Package> {
    let context = format!("package {}", requested_id);
    let raw: RawPackage = serde_json::from_str(body).map_err(|e| ApiError::Json {
        context: context.clone(),
        source: e,
    })?;

    let message = raw.message.unwrap_or_else(|| "UNKNOWN".to_string());
    match raw.response.as_deref() {
        Some(RESPONSE_UNKNOWN_PACKAGE) => {
            return Err(ApiError::PackageNotFound {
                package_id: requested_id.to_string(),
            })
        }
        Some(RESPONSE_AUTHENTICATION_FAILED) => {
            return Err(ApiError::AuthenticationFailed {
                package_id: requested_id.to_string(),
                message,
            })
        }
        Some(RESPONSE_SUCCESS) => {}
        Some(other) => {
            return Err(ApiError::UnexpectedResponse {
                response: other.to_string(),
                message,
            })
        }
        None => {}
    }

    let package_id = require(raw.package_id, "packageId", &context)?;
    let package_code = require(raw.package_code, "packageCode", &context)?;
    let server_secret = require(raw.server_secret, "serverSecret", &context)?;

    let files = raw
        .files
        .into_iter()
        .enumerate()
        .map(|(i, file)| {
            // 1-indexed to match how the files are listed in the web UI
            let file_context = format!("element {} of the files array in {}", i + 1, context);
            let uploaded_raw = require(file.file_uploaded, "fileUploaded", &file_context)?;
            Ok(PackageFile {
                file_id: require(file.file_id, "fileId", &file_context)?,
                file_name: require(file.file_name, "fileName", &file_context)?,
                file_size: parse_file_size(
                    require(file.file_size, "fileSize", &file_context)?,
                    &file_context,
                )?,
                parts: require(file.parts, "parts", &file_context)?,
                uploaded_at: parse_server_date(&uploaded_raw, "fileUploaded", &file_context)?,
                version: require(file.file_version, "fileVersion", &file_context)?,
                created_by_email: require(file.created_by_email, "createdByEmail", &file_context)?,
            })
        })
        .collect::<ApiResult<Vec<_>>>()?;

    let directory_ids = raw
        .directories
        .into_iter()
        .enumerate()
        .map(|(i, dir)| {
            require(
                dir.id,
                "id",
                &format!("element {} of the directories array in {}", i + 1, context),
            )
        })
        .collect::<ApiResult<Vec<_>>>()?;

    let state = require(raw.state, "state", &context)?;
    let timestamp_raw = require(raw.package_timestamp, "packageTimestamp", &context)?;
    let package_timestamp = parse_server_date(&timestamp_raw, "packageTimestamp", &context)?;
    let response = require(raw.response, "response", &context)?;

    Ok(Package {
        package_id,
        package_code,
        server_secret,
        files,
        directory_ids,
        state,
        package_timestamp,
        response,
    })
}

/// Parse a download-urls response body.
pub fn parse_download_urls(body: &str) -> ApiResult<Vec<DownloadUrl>> {
    let raw: RawDownloadUrls = serde_json::from_str(body).map_err(|e| ApiError::Json {
        context: "download urls response".to_string(),
        source: e,
    })?;

    match raw.response.as_deref() {
        Some(RESPONSE_SUCCESS) => Ok(raw.download_urls),
        other => Err(ApiError::UnexpectedResponse {
            response: other.unwrap_or("<missing>").to_string(),
            message: raw
                .message
                .unwrap_or_else(|| format!("full response was '{}'", body)),
        }),
    }
}

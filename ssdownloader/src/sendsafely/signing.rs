//! Request signing and key-code checksums.
//!
//! The signature covers `api_key || url_path || timestamp || body`, where
//! `url_path` is the logical resource path (`/api/v2.0/package/...`), never
//! the full request URL with its host.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::error::{ApiError, ApiResult};

type HmacSha256 = Hmac<Sha256>;

/// PBKDF2 iterations used for the download-urls checksum.
pub const CHECKSUM_ITERATIONS: u32 = 1024;

/// Length of the derived checksum key in bytes.
pub const CHECKSUM_KEY_LEN: usize = 32;

/// Format of the `ss-request-timestamp` header.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// Compute the hex HMAC-SHA256 request signature.
pub fn request_signature(
    api_key: &str,
    api_secret: &str,
    url_path: &str,
    timestamp: &str,
    body: &str,
) -> ApiResult<String> {
    let mut mac = HmacSha256::new_from_slice(api_secret.as_bytes())
        .map_err(|e| ApiError::Signature(e.to_string()))?;
    mac.update(api_key.as_bytes());
    mac.update(url_path.as_bytes());
    mac.update(timestamp.as_bytes());
    mac.update(body.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Derive the hex checksum proving possession of the key code.
pub fn segment_checksum(key_code: &str, package_code: &str) -> String {
    let mut key = [0u8; CHECKSUM_KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(
        key_code.as_bytes(),
        package_code.as_bytes(),
        CHECKSUM_ITERATIONS,
        &mut key,
    );
    hex::encode(key)
}

/// Render a timestamp for the `ss-request-timestamp` header.
pub fn format_timestamp(now: DateTime<Utc>) -> String {
    now.format(TIMESTAMP_FORMAT).to_string()
}

//! Signed HTTP client for the package and download-urls endpoints.

use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;
use tracing::{debug, trace};

use super::error::{ApiError, ApiResult};
use super::model::{parse_download_urls, parse_package, DownloadUrl, Package};
use super::signing::{format_timestamp, request_signature, segment_checksum};
use crate::clock::{Clock, SystemClock};
use crate::planner::MAX_SEGMENTS_PER_REQUEST;

/// Host prefix of every request URL.
pub const API_BASE_URL: &str = "https://app.sendsafely.com";

/// Logical path prefix; this (not the full URL) is what gets signed.
pub const API_PATH_PREFIX: &str = "/api/v2.0";

/// Default timeout for API requests in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Package metadata and segment URL lookups.
///
/// The orchestrator depends on this trait rather than on
/// [`SendSafelyClient`] so it can be driven by a scripted fake.
pub trait PackageClient: Send + Sync {
    /// Fetch the metadata for one package.
    fn retrieve_package(&self, package_id: &str) -> ApiResult<Package>;

    /// Fetch pre-signed URLs for segments `start..=end` of one file.
    fn get_download_urls(
        &self,
        package: &Package,
        file_id: &str,
        key_code: &str,
        start: u32,
        end: u32,
    ) -> ApiResult<Vec<DownloadUrl>>;
}

/// HTTP method of an [`ApiRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A fully signed request ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl ApiRequest {
    /// Look up a header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Status and body of an API response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

/// Sends signed requests.
///
/// Abstracted so the client can be tested without network access.
pub trait ApiTransport: Send + Sync {
    fn execute(&self, request: &ApiRequest) -> ApiResult<ApiResponse>;
}

/// Blocking reqwest transport.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport with the default timeout.
    pub fn new() -> ApiResult<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a transport with a custom timeout.
    pub fn with_timeout(timeout: Duration) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::ClientBuild(e.to_string()))?;
        Ok(Self { client })
    }
}

impl ApiTransport for ReqwestTransport {
    fn execute(&self, request: &ApiRequest) -> ApiResult<ApiResponse> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().map_err(|e| ApiError::Request {
            url: request.url.clone(),
            reason: e.to_string(),
        })?;
        let status = response.status().as_u16();
        let body = response.text().map_err(|e| ApiError::Request {
            url: request.url.clone(),
            reason: format!("unable to read response body: {}", e),
        })?;
        Ok(ApiResponse { status, body })
    }
}

/// SendSafely API client authenticated with an API key and secret.
pub struct SendSafelyClient<T: ApiTransport = ReqwestTransport> {
    api_key: String,
    api_secret: String,
    transport: T,
    clock: Arc<dyn Clock>,
    base_url: String,
}

impl SendSafelyClient<ReqwestTransport> {
    /// Create a client that talks to the public SendSafely host.
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> ApiResult<Self> {
        Ok(Self::with_transport(
            api_key,
            api_secret,
            ReqwestTransport::new()?,
        ))
    }
}

impl<T: ApiTransport> SendSafelyClient<T> {
    /// Create a client over a custom transport.
    pub fn with_transport(
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        transport: T,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            transport,
            clock: Arc::new(SystemClock),
            base_url: API_BASE_URL.to_string(),
        }
    }

    /// Use a different clock for request timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Send requests to a different host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Build a signed request for `url_path`.
    fn signed_request(
        &self,
        method: Method,
        url_path: &str,
        body: Option<String>,
    ) -> ApiResult<ApiRequest> {
        let timestamp = format_timestamp(self.clock.now());
        let signature = request_signature(
            &self.api_key,
            &self.api_secret,
            url_path,
            &timestamp,
            body.as_deref().unwrap_or_default(),
        )?;

        let mut headers = vec![
            ("ss-api-key".to_string(), self.api_key.clone()),
            ("ss-request-timestamp".to_string(), timestamp),
            ("ss-request-signature".to_string(), signature),
        ];
        if body.is_some() {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }

        Ok(ApiRequest {
            method,
            url: format!("{}{}", self.base_url, url_path),
            headers,
            body,
        })
    }

    /// Send a request and parse its body.
    ///
    /// Error payloads arrive with non-2xx statuses, so the body is parsed
    /// first; the status only matters when the body is not JSON.
    fn send<R>(
        &self,
        request: &ApiRequest,
        parse: impl FnOnce(&str) -> ApiResult<R>,
    ) -> ApiResult<R> {
        let response = self.transport.execute(request)?;
        trace!(url = %request.url, status = response.status, body_len = response.body.len(), "api response");
        match parse(&response.body) {
            Err(ApiError::Json { .. }) if !(200..300).contains(&response.status) => {
                Err(ApiError::Status {
                    url: request.url.clone(),
                    status: response.status,
                    body: response.body,
                })
            }
            result => result,
        }
    }
}

impl<T: ApiTransport> PackageClient for SendSafelyClient<T> {
    fn retrieve_package(&self, package_id: &str) -> ApiResult<Package> {
        let url_path = format!("{}/package/{}", API_PATH_PREFIX, package_id);
        let request = self.signed_request(Method::Get, &url_path, None)?;
        debug!(package_id = %package_id, url_path = %url_path, "retrieving package");
        self.send(&request, |body| parse_package(package_id, body))
    }

    fn get_download_urls(
        &self,
        package: &Package,
        file_id: &str,
        key_code: &str,
        start: u32,
        end: u32,
    ) -> ApiResult<Vec<DownloadUrl>> {
        if start == 0 || end < start || end - start + 1 > MAX_SEGMENTS_PER_REQUEST {
            return Err(ApiError::SegmentRange {
                start,
                end,
                max: MAX_SEGMENTS_PER_REQUEST,
            });
        }

        let url_path = format!(
            "{}/package/{}/file/{}/download-urls/",
            API_PATH_PREFIX, package.package_id, file_id
        );
        let checksum = segment_checksum(key_code, &package.package_code);
        let body = format!(
            "{{\"checksum\":\"{}\",\"startSegment\":{},\"endSegment\":{}}}",
            checksum, start, end
        );
        let request = self.signed_request(Method::Post, &url_path, Some(body))?;
        debug!(
            package_id = %package.package_id,
            file_id = %file_id,
            start_segment = start,
            end_segment = end,
            "requesting download urls"
        );
        self.send(&request, parse_download_urls)
    }
}

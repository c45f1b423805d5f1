//! Error types for the SendSafely API client.

use thiserror::Error;

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors returned by the SendSafely API client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The service does not know the package; links expire.
    #[error("unable to find package {package_id} as it is likely expired")]
    PackageNotFound { package_id: String },

    /// The API key or signature was rejected.
    #[error("failed authentication for package {package_id} due to '{message}'")]
    AuthenticationFailed { package_id: String, message: String },

    /// A required response field was absent.
    #[error("unable to get {field} from {context}")]
    MissingField { field: String, context: String },

    /// A response field was present but unusable.
    #[error("invalid {field} value '{value}' in {context}: {reason}")]
    InvalidField {
        field: String,
        value: String,
        context: String,
        reason: String,
    },

    /// The service answered with a non-success `response` code.
    #[error("unexpected response {response} from sendsafely: {message}")]
    UnexpectedResponse { response: String, message: String },

    /// The response body was not valid JSON.
    #[error("unable to parse json from {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The request could not be sent.
    #[error("request to '{url}' failed: {reason}")]
    Request { url: String, reason: String },

    /// The service answered with a non-success HTTP status and no usable body.
    #[error("request to '{url}' failed with status {status}: {body}")]
    Status { url: String, status: u16, body: String },

    /// More segments were requested than one call may return.
    #[error("segment range {start}-{end} is invalid, at most {max} segments may be requested per call")]
    SegmentRange { start: u32, end: u32, max: u32 },

    /// The request signature could not be computed.
    #[error("unable to sign request: {0}")]
    Signature(String),

    /// The HTTP client could not be built.
    #[error("unable to build HTTP client: {0}")]
    ClientBuild(String),
}

//! SendSafely REST API access.
//!
//! Every request is signed with the account's API secret (see [`signing`]);
//! the download-urls call additionally proves possession of the link's key
//! code through a PBKDF2 checksum.
//!
//! # Example
//!
//! ```ignore
//! use ssdownloader::sendsafely::{PackageClient, SendSafelyClient};
//!
//! let client = SendSafelyClient::new("api-key", "api-secret")?;
//! let package = client.retrieve_package("GVG2-MNZT")?;
//! for file in &package.files {
//!     println!("{} ({} parts)", file.file_name, file.parts);
//! }
//! ```

mod client;
mod error;
mod model;
pub mod signing;

pub use client::{
    ApiRequest, ApiResponse, ApiTransport, Method, PackageClient, ReqwestTransport, SendSafelyClient,
    API_BASE_URL, API_PATH_PREFIX,
};
pub use error::{ApiError, ApiResult};
pub use model::{parse_download_urls, parse_package, DownloadUrl, Package, PackageFile};

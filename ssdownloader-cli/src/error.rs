//! CLI error type.

use std::fmt;

use ssdownloader::config::ConfigError;
use ssdownloader::downloader::DownloadError;
use ssdownloader::link::LinkError;
use ssdownloader::logging::LoggingError;
use ssdownloader::orchestrator::PackageError;
use ssdownloader::pool::PoolError;
use ssdownloader::sendsafely::ApiError;
use ssdownloader::zendesk::ZendeskError;

/// Everything a command can fail with. Printed once by `main`.
#[derive(Debug)]
pub enum CliError {
    /// Missing or unusable settings.
    Config(String),
    ConfigFile(ConfigError),
    Link(LinkError),
    Api(ApiError),
    Download(DownloadError),
    Package(PackageError),
    Zendesk(ZendeskError),
    Pool(PoolError),
    Logging(LoggingError),
    /// An interactive prompt failed.
    Prompt(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::ConfigFile(e) => write!(f, "Configuration error: {}", e),
            CliError::Link(e) => write!(f, "Invalid link: {}", e),
            CliError::Api(e) => write!(f, "SendSafely error: {}", e),
            CliError::Download(e) => write!(f, "Download error: {}", e),
            CliError::Package(e) => write!(f, "Package error: {}", e),
            CliError::Zendesk(e) => write!(f, "Zendesk error: {}", e),
            CliError::Pool(e) => write!(f, "Worker pool error: {}", e),
            CliError::Logging(e) => write!(f, "Logging error: {}", e),
            CliError::Prompt(msg) => write!(f, "Prompt failed: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::ConfigFile(e) => Some(e),
            CliError::Link(e) => Some(e),
            CliError::Api(e) => Some(e),
            CliError::Download(e) => Some(e),
            CliError::Package(e) => Some(e),
            CliError::Zendesk(e) => Some(e),
            CliError::Pool(e) => Some(e),
            CliError::Logging(e) => Some(e),
            CliError::Config(_) | CliError::Prompt(_) => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::ConfigFile(e)
    }
}

impl From<LinkError> for CliError {
    fn from(e: LinkError) -> Self {
        CliError::Link(e)
    }
}

impl From<ApiError> for CliError {
    fn from(e: ApiError) -> Self {
        CliError::Api(e)
    }
}

impl From<DownloadError> for CliError {
    fn from(e: DownloadError) -> Self {
        CliError::Download(e)
    }
}

impl From<PackageError> for CliError {
    fn from(e: PackageError) -> Self {
        CliError::Package(e)
    }
}

impl From<ZendeskError> for CliError {
    fn from(e: ZendeskError) -> Self {
        CliError::Zendesk(e)
    }
}

impl From<PoolError> for CliError {
    fn from(e: PoolError) -> Self {
        CliError::Pool(e)
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<dialoguer::Error> for CliError {
    fn from(e: dialoguer::Error) -> Self {
        CliError::Prompt(e.to_string())
    }
}

//! Persistent settings stored as an INI file.
//!
//! ```ini
//! [sendsafely]
//! api_key = ...
//! api_secret = ...
//!
//! [zendesk]
//! subdomain = acme
//! email = me@acme.com
//! token = ...
//!
//! [download]
//! dir = /home/me/.sendsafely
//! buffer_size_kb = 4096
//! threads = 8
//! max_file_size_gib = 10
//! ```
//!
//! Missing keys take their defaults; command-line flags are layered on top
//! through the `with_*` setters.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;
use tracing::debug;

use crate::downloader::DEFAULT_BUFFER_SIZE_KB;
use crate::pool::DEFAULT_THREADS;

/// Default max file size in GiB.
pub const DEFAULT_MAX_FILE_SIZE_GIB: u64 = 10;

/// Bytes per GiB for the max file size limit (base 1000).
pub const BYTES_PER_GIB: u64 = 1_000_000_000;

const SECTION_SENDSAFELY: &str = "sendsafely";
const SECTION_ZENDESK: &str = "zendesk";
const SECTION_DOWNLOAD: &str = "download";

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors reading or writing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No config or home directory could be determined.
    #[error("unable to determine the user configuration directory")]
    NoConfigDir,
    /// The file exists but could not be read or parsed.
    #[error("unable to process the file '{}', this may indicate the file format is incorrect: {reason}", .path.display())]
    Load { path: PathBuf, reason: String },
    /// A value is present but not usable.
    #[error("invalid value '{value}' for [{section}] {key} in '{}'", .path.display())]
    InvalidValue {
        path: PathBuf,
        section: &'static str,
        key: &'static str,
        value: String,
    },
    /// Creating the directory or writing the file failed.
    #[error("unable to write configuration file to '{}': {source}", .path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Default location: `<config dir>/ssdownloader/config.ini`.
pub fn default_config_path() -> ConfigResult<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("ssdownloader").join("config.ini"))
        .ok_or(ConfigError::NoConfigDir)
}

/// Default download directory: `~/.sendsafely`.
pub fn default_download_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".sendsafely"))
        .unwrap_or_else(|| PathBuf::from(".sendsafely"))
}

/// All user settings.
#[derive(Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub ss_api_key: String,
    pub ss_api_secret: String,
    pub zendesk_subdomain: String,
    pub zendesk_email: String,
    pub zendesk_token: String,
    pub download_dir: PathBuf,
    pub buffer_size_kb: i64,
    pub threads: usize,
    pub max_file_size_gib: u64,
}

impl fmt::Debug for ConfigFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigFile")
            .field("ss_api_key", &self.ss_api_key)
            .field("ss_api_secret", &"<redacted>")
            .field("zendesk_subdomain", &self.zendesk_subdomain)
            .field("zendesk_email", &self.zendesk_email)
            .field("zendesk_token", &"<redacted>")
            .field("download_dir", &self.download_dir)
            .field("buffer_size_kb", &self.buffer_size_kb)
            .field("threads", &self.threads)
            .field("max_file_size_gib", &self.max_file_size_gib)
            .finish()
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            ss_api_key: String::new(),
            ss_api_secret: String::new(),
            zendesk_subdomain: String::new(),
            zendesk_email: String::new(),
            zendesk_token: String::new(),
            download_dir: default_download_dir(),
            buffer_size_kb: DEFAULT_BUFFER_SIZE_KB,
            threads: DEFAULT_THREADS,
            max_file_size_gib: DEFAULT_MAX_FILE_SIZE_GIB,
        }
    }
}

impl ConfigFile {
    /// Load from the default location, falling back to defaults if absent.
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&default_config_path()?)
    }

    /// Load from `path`, falling back to defaults if the file is absent.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let get = |section: &str, key: &str| ini_value(&ini, section, key);

        let mut config = Self::default();
        if let Some(v) = get(SECTION_SENDSAFELY, "api_key") {
            config.ss_api_key = v.to_string();
        }
        if let Some(v) = get(SECTION_SENDSAFELY, "api_secret") {
            config.ss_api_secret = v.to_string();
        }
        if let Some(v) = get(SECTION_ZENDESK, "subdomain") {
            config.zendesk_subdomain = v.to_string();
        }
        if let Some(v) = get(SECTION_ZENDESK, "email") {
            config.zendesk_email = v.to_string();
        }
        if let Some(v) = get(SECTION_ZENDESK, "token") {
            config.zendesk_token = v.to_string();
        }
        if let Some(v) = get(SECTION_DOWNLOAD, "dir") {
            config.download_dir = PathBuf::from(v);
        }
        if let Some(v) = get(SECTION_DOWNLOAD, "buffer_size_kb") {
            config.buffer_size_kb = parse_value(path, "buffer_size_kb", v)?;
        }
        if let Some(v) = get(SECTION_DOWNLOAD, "threads") {
            config.threads = parse_value(path, "threads", v)?;
        }
        if let Some(v) = get(SECTION_DOWNLOAD, "max_file_size_gib") {
            config.max_file_size_gib = parse_value(path, "max_file_size_gib", v)?;
        }

        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Save to the default location.
    pub fn save(&self) -> ConfigResult<PathBuf> {
        let path = default_config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save to `path`, creating parent directories. The file is owner-only.
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        let save_err = |e| ConfigError::Save {
            path: path.to_path_buf(),
            source: e,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(save_err)?;
        }

        let mut ini = Ini::new();
        ini.with_section(Some(SECTION_SENDSAFELY))
            .set("api_key", self.ss_api_key.as_str())
            .set("api_secret", self.ss_api_secret.as_str());
        ini.with_section(Some(SECTION_ZENDESK))
            .set("subdomain", self.zendesk_subdomain.as_str())
            .set("email", self.zendesk_email.as_str())
            .set("token", self.zendesk_token.as_str());
        ini.with_section(Some(SECTION_DOWNLOAD))
            .set("dir", self.download_dir.to_string_lossy())
            .set("buffer_size_kb", self.buffer_size_kb.to_string())
            .set("threads", self.threads.to_string())
            .set("max_file_size_gib", self.max_file_size_gib.to_string());

        ini.write_to_file(path).map_err(save_err)?;
        restrict_permissions(path).map_err(save_err)?;
        debug!(path = %path.display(), "config saved");
        Ok(())
    }

    pub fn with_ss_api_key(mut self, key: impl Into<String>) -> Self {
        self.ss_api_key = key.into();
        self
    }

    pub fn with_ss_api_secret(mut self, secret: impl Into<String>) -> Self {
        self.ss_api_secret = secret.into();
        self
    }

    pub fn with_zendesk_subdomain(mut self, subdomain: impl Into<String>) -> Self {
        self.zendesk_subdomain = subdomain.into();
        self
    }

    pub fn with_zendesk_email(mut self, email: impl Into<String>) -> Self {
        self.zendesk_email = email.into();
        self
    }

    pub fn with_zendesk_token(mut self, token: impl Into<String>) -> Self {
        self.zendesk_token = token.into();
        self
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    pub fn with_buffer_size_kb(mut self, kb: i64) -> Self {
        self.buffer_size_kb = kb;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_max_file_size_gib(mut self, gib: u64) -> Self {
        self.max_file_size_gib = gib;
        self
    }

    /// Max file size limit in bytes.
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_gib.saturating_mul(BYTES_PER_GIB)
    }
}

fn ini_value<'a>(ini: &'a Ini, section: &str, key: &str) -> Option<&'a str> {
    ini.section(Some(section))
        .and_then(|props| props.get(key))
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn parse_value<T: std::str::FromStr>(path: &Path, key: &'static str, value: &str) -> ConfigResult<T> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        path: path.to_path_buf(),
        section: SECTION_DOWNLOAD,
        key,
        value: value.to_string(),
    })
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = ConfigFile::load_from(&temp.path().join("absent.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
        assert_eq!(config.buffer_size_kb, 4096);
        assert_eq!(config.threads, 8);
        assert_eq!(config.max_file_size_bytes(), 10_000_000_000);
    }

    #[test]
    fn test_save_then_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.ini");
        let config = ConfigFile::default()
            .with_ss_api_key("key")
            .with_ss_api_secret("secret")
            .with_zendesk_subdomain("acme")
            .with_zendesk_email("me@acme.com")
            .with_zendesk_token("tok")
            .with_download_dir(temp.path().join("dl"))
            .with_threads(3);

        config.save_to(&path).unwrap();
        let loaded = ConfigFile::load_from(&path).unwrap();

        assert_eq!(loaded, config);
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.ini");
        ConfigFile::default().save_to(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.ini");
        fs::write(&path, "[zendesk]\nsubdomain = acme\n").unwrap();

        let config = ConfigFile::load_from(&path).unwrap();

        assert_eq!(config.zendesk_subdomain, "acme");
        assert_eq!(config.threads, DEFAULT_THREADS);
        assert_eq!(config.download_dir, default_download_dir());
    }

    #[test]
    fn test_invalid_number() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.ini");
        fs::write(&path, "[download]\nthreads = many\n").unwrap();

        let err = ConfigFile::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "threads", .. }));
        assert!(err.to_string().contains("'many'"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = ConfigFile::default()
            .with_ss_api_secret("s3cr3t")
            .with_zendesk_token("t0k3n");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("s3cr3t"));
        assert!(!debug.contains("t0k3n"));
    }

    #[test]
    fn test_save_failure_keeps_io_source() {
        use std::error::Error as _;

        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, "not a dir").unwrap();
        let path = blocker.join("config.ini");

        let err = ConfigFile::default().save_to(&path).unwrap_err();

        assert!(matches!(err, ConfigError::Save { .. }));
        assert!(err
            .to_string()
            .starts_with(&format!("unable to write configuration file to '{}'", path.display())));
        assert!(err.source().is_some());
    }
}

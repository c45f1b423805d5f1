//! ssdownloader - downloads SendSafely packages from a link or a Zendesk ticket.

mod commands;
mod error;

use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use ssdownloader::config::{default_config_path, ConfigFile};
use ssdownloader::logging;

use crate::error::CliError;

#[derive(Parser)]
#[command(name = "ssdownloader")]
#[command(version)]
#[command(about = "Downloads files from SendSafely either via Zendesk ticket number or via SendSafely link")]
#[command(long_about = "Downloads files from SendSafely either via Zendesk ticket number or via SendSafely link.

Examples:

  by link
    ssdownloader link \"https://sendsafely.tester.com/receive/?thread=MYTHREAD&packageCode=MYPKGCODE#keyCode=MYKEYCODE\"

  by zendesk ticket
    ssdownloader ticket 111111")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by every command. Values given here override the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// The SendSafely API key
    #[arg(long, global = true)]
    pub ss_api_key: Option<String>,

    /// The SendSafely API secret
    #[arg(long, global = true)]
    pub ss_api_secret: Option<String>,

    /// The customer part of the Zendesk url, i.e. 'test' for https://test.zendesk.com
    #[arg(long, global = true)]
    pub zendesk_subdomain: Option<String>,

    /// Zendesk email address
    #[arg(long, global = true)]
    pub zendesk_email: Option<String>,

    /// Zendesk API token
    #[arg(long, global = true)]
    pub zendesk_token: Option<String>,

    /// Base directory to put downloads [default: ~/.sendsafely]
    #[arg(long, global = true)]
    pub download_dir: Option<PathBuf>,

    /// Buffer size in KB to use during downloads [default: 4096]
    #[arg(short = 'b', long, global = true)]
    pub download_buffer_size_kb: Option<i64>,

    /// Number of threads to use when downloading [default: 8]
    #[arg(short = 't', long, global = true)]
    pub download_threads: Option<usize>,

    /// Max file size in GiB (base 1000); larger files are skipped [default: 10]
    #[arg(short = 'm', long, global = true)]
    pub max_file_size_gib: Option<u64>,

    /// Alternate configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

impl GlobalArgs {
    /// Path of the configuration file in use.
    pub fn config_path(&self) -> Result<PathBuf, CliError> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => Ok(default_config_path()?),
        }
    }

    /// Load the config file and apply flag overrides.
    pub fn resolve(&self) -> Result<ConfigFile, CliError> {
        let mut config = ConfigFile::load_from(&self.config_path()?)?;
        if let Some(v) = &self.ss_api_key {
            config = config.with_ss_api_key(v.as_str());
        }
        if let Some(v) = &self.ss_api_secret {
            config = config.with_ss_api_secret(v.as_str());
        }
        if let Some(v) = &self.zendesk_subdomain {
            config = config.with_zendesk_subdomain(v.as_str());
        }
        if let Some(v) = &self.zendesk_email {
            config = config.with_zendesk_email(v.as_str());
        }
        if let Some(v) = &self.zendesk_token {
            config = config.with_zendesk_token(v.as_str());
        }
        if let Some(v) = &self.download_dir {
            config = config.with_download_dir(v.clone());
        }
        if let Some(v) = self.download_buffer_size_kb {
            config = config.with_buffer_size_kb(v);
        }
        if let Some(v) = self.download_threads {
            config = config.with_threads(v);
        }
        if let Some(v) = self.max_file_size_gib {
            config = config.with_max_file_size_gib(v);
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Write a configuration file, prompting for any credential not given as a flag
    Init,

    /// Download every file of the package behind a SendSafely link
    Link {
        /// SendSafely link, optionally wrapped by a Google redirect
        url: String,
    },

    /// Download all SendSafely packages and attachments for a Zendesk ticket
    Ticket {
        /// Zendesk ticket id
        ticket_id: String,

        /// Prompt for a password instead of using the Zendesk API token
        #[arg(short = 'p', long)]
        zendesk_password: bool,

        /// Only download SendSafely links, not ticket attachments
        #[arg(long)]
        sendsafely_only: bool,
    },
}

fn header() -> String {
    format!(
        "ssdownloader {}-{}-{}",
        ssdownloader::VERSION,
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

fn main() {
    let cli = Cli::parse();

    let _guard = match logging::init(cli.global.verbose, cli.global.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {}", CliError::from(e));
            process::exit(1);
        }
    };

    println!("{}", header());

    let result = match cli.command {
        Commands::Init => commands::init::run(&cli.global),
        Commands::Link { url } => commands::link::run(&cli.global, &url),
        Commands::Ticket {
            ticket_id,
            zendesk_password,
            sendsafely_only,
        } => commands::ticket::run(&cli.global, &ticket_id, zendesk_password, sendsafely_only),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_ticket_flags() {
        let cli = Cli::try_parse_from([
            "ssdownloader",
            "ticket",
            "1111",
            "-p",
            "--sendsafely-only",
            "-v",
            "--download-threads",
            "3",
        ])
        .unwrap();

        assert!(cli.global.verbose);
        assert_eq!(cli.global.download_threads, Some(3));
        match cli.command {
            Commands::Ticket {
                ticket_id,
                zendesk_password,
                sendsafely_only,
            } => {
                assert_eq!(ticket_id, "1111");
                assert!(zendesk_password);
                assert!(sendsafely_only);
            }
            _ => panic!("expected ticket command"),
        }
    }

    #[test]
    fn test_link_requires_url() {
        assert!(Cli::try_parse_from(["ssdownloader", "link"]).is_err());
    }

    #[test]
    fn test_flags_override_config_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.ini");
        ConfigFile::default()
            .with_ss_api_key("from-file")
            .with_zendesk_subdomain("acme")
            .with_threads(2)
            .save_to(&path)
            .unwrap();

        let global = GlobalArgs {
            ss_api_key: Some("from-flag".to_string()),
            max_file_size_gib: Some(1),
            config: Some(path),
            ..Default::default()
        };
        let config = global.resolve().unwrap();

        assert_eq!(config.ss_api_key, "from-flag");
        assert_eq!(config.zendesk_subdomain, "acme");
        assert_eq!(config.threads, 2);
        assert_eq!(config.max_file_size_bytes(), 1_000_000_000);
    }
}

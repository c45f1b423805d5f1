//! Link command - download one package from a share link.

use std::sync::Arc;

use ssdownloader::downloader::HttpSegmentDownloader;
use ssdownloader::link::parse_link;
use ssdownloader::orchestrator::{DownloadArgs, PackageDownloader};
use ssdownloader::reporting::Reporting;
use ssdownloader::sendsafely::SendSafelyClient;
use tracing::info;

use super::{print_results, require};
use crate::error::CliError;
use crate::GlobalArgs;

/// Run the link command.
pub fn run(global: &GlobalArgs, url: &str) -> Result<(), CliError> {
    let config = global.resolve()?;
    let api_key = require(&config.ss_api_key, "ss-api-key", "[sendsafely] api_key")?;
    let api_secret = require(&config.ss_api_secret, "ss-api-secret", "[sendsafely] api_secret")?;

    let parts = parse_link(url)?;
    let client = SendSafelyClient::new(api_key, api_secret)?;
    let downloader = HttpSegmentDownloader::new(config.buffer_size_kb)?;
    let reporting = Arc::new(Reporting::new());

    let args = DownloadArgs::new(&config.download_dir, &parts.package_code, &parts.key_code)
        .with_sub_dir("packages")
        .with_max_file_size(config.max_file_size_bytes());
    let outcome = PackageDownloader::new(&client, &downloader, Arc::clone(&reporting))
        .download_package(&args)?;

    info!(dir = %outcome.out_dir.display(), "package downloaded");
    println!("files are located at {}", outcome.out_dir.display());
    print_results(&outcome.invalid_files, &reporting);
    Ok(())
}

//! Ticket command - download every package and attachment of a Zendesk ticket.

use std::sync::Arc;

use dialoguer::Password;
use indicatif::{ProgressBar, ProgressStyle};
use ssdownloader::downloader::HttpSegmentDownloader;
use ssdownloader::pool::{TicketJob, WorkerPool};
use ssdownloader::reporting::Reporting;
use ssdownloader::sendsafely::SendSafelyClient;
use ssdownloader::zendesk::ZendeskClient;
use tracing::info;

use super::{print_results, require};
use crate::error::CliError;
use crate::GlobalArgs;

fn progress_bar(units: usize) -> ProgressBar {
    let bar = ProgressBar::new(units as u64);
    if let Ok(style) = ProgressStyle::with_template(
        "  {spinner:.cyan} Downloading [{bar:30.cyan/dim}] {pos}/{len} ({elapsed})",
    ) {
        bar.set_style(style.progress_chars("━╸─"));
    }
    bar
}

/// Run the ticket command.
pub fn run(
    global: &GlobalArgs,
    ticket_id: &str,
    zendesk_password: bool,
    sendsafely_only: bool,
) -> Result<(), CliError> {
    let config = global.resolve()?;
    let api_key = require(&config.ss_api_key, "ss-api-key", "[sendsafely] api_key")?;
    let api_secret = require(&config.ss_api_secret, "ss-api-secret", "[sendsafely] api_secret")?;
    let subdomain = require(&config.zendesk_subdomain, "zendesk-subdomain", "[zendesk] subdomain")?;
    let email = require(&config.zendesk_email, "zendesk-email", "[zendesk] email")?;

    let secret = if zendesk_password {
        Password::new()
            .with_prompt("enter password")
            .interact()?
            .trim()
            .to_string()
    } else {
        require(&config.zendesk_token, "zendesk-token", "[zendesk] token")?.to_string()
    };

    let zendesk = ZendeskClient::new(email, secret, subdomain)?;
    let contents = zendesk.ticket_contents(ticket_id)?;

    let client = SendSafelyClient::new(api_key, api_secret)?;
    let downloader = HttpSegmentDownloader::new(config.buffer_size_kb)?;
    let reporting = Arc::new(Reporting::new());
    let pool = WorkerPool::new(config.threads)?;

    let job = TicketJob::new(
        &client,
        &downloader,
        Arc::clone(&reporting),
        &config.download_dir,
        ticket_id,
    )
    .with_max_file_size(config.max_file_size_bytes())
    .with_sendsafely_only(sendsafely_only);

    let units = job.unit_count(&contents);
    info!(ticket_id, units, threads = pool.threads(), "downloading ticket");
    let bar = progress_bar(units);
    let invalid_files = job.run(&pool, &contents, &|| bar.inc(1));
    bar.finish_and_clear();

    print_results(&invalid_files, &reporting);
    Ok(())
}

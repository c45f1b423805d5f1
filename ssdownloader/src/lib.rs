//! ssdownloader - SendSafely package downloader.
//!
//! Retrieves encrypted SendSafely packages, either from a single share link
//! or from every link and attachment found in a Zendesk ticket, and rebuilds
//! the original files on disk.
//!
//! The pipeline for one package is:
//!
//! 1. [`link`] extracts the package code and key code from a share URL
//! 2. [`sendsafely`] fetches signed package metadata and segment URLs
//! 3. [`planner`] batches segment numbers into API-sized requests
//! 4. [`downloader`] fetches each encrypted segment
//! 5. [`decrypt`] decrypts each segment with the package passphrase
//! 6. [`combiner`] joins the decrypted segments in part order
//!
//! [`orchestrator`] drives those steps for one package, and [`pool`] runs
//! many packages and ticket attachments on a bounded worker pool while
//! [`reporting`] keeps the run totals.

pub mod attachment;
pub mod clock;
pub mod combiner;
pub mod config;
pub mod decrypt;
pub mod downloader;
pub mod link;
pub mod logging;
pub mod orchestrator;
pub mod planner;
pub mod pool;
pub mod reporting;
pub mod sendsafely;
pub mod zendesk;

#[cfg(test)]
mod testing;

/// Current crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

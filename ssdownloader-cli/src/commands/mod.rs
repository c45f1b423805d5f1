//! Command implementations.

pub mod init;
pub mod link;
pub mod ticket;

use std::path::PathBuf;

use console::style;
use ssdownloader::reporting::{invalid_files_report, Reporting};

use crate::error::CliError;

/// Fail with a hint naming the flag and config key when `value` is empty.
pub fn require<'a>(value: &'a str, flag: &str, key: &str) -> Result<&'a str, CliError> {
    if value.trim().is_empty() {
        return Err(CliError::Config(format!(
            "{} is not set, pass --{} or set it in config.ini (run 'ssdownloader init')",
            key, flag
        )));
    }
    Ok(value)
}

/// Print the invalid-files report (if any) and the run summary.
pub fn print_results(invalid_files: &[PathBuf], reporting: &Reporting) {
    let report = invalid_files_report(invalid_files);
    if !report.is_empty() {
        println!("{}", style(report).yellow());
    }
    println!("{}", reporting.snapshot().summary());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_rejects_blank() {
        let err = require("  ", "ss-api-key", "[sendsafely] api_key").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("--ss-api-key"));
        assert!(message.contains("[sendsafely] api_key"));
        assert_eq!(require("key", "ss-api-key", "api_key").unwrap(), "key");
    }
}

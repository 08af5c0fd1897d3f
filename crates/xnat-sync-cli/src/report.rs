//! Fatal error reporting

use crate::api::classify::error_fragment;
use crate::error::SyncError;
use colored::Colorize;
use tracing::error;

/// Diagnostic lines for `err`: the error itself, then the readable part of
/// the archive's response body when there is one.
pub fn lines(err: &SyncError) -> Vec<String> {
    let mut lines = vec![err.to_string()];
    if let Some(fragment) = err.body().and_then(error_fragment) {
        lines.push(fragment);
    }
    lines
}

/// Print a labeled `error:` diagnostic to stderr.
pub fn report(err: &SyncError) {
    error!(error = %err, "Command failed");

    let mut lines = lines(err).into_iter();
    if let Some(first) = lines.next() {
        eprintln!("{} {}", "error:".red().bold(), first);
    }
    for line in lines {
        eprintln!("  {}", line.dimmed());
    }
}

//! CLI command implementations
//!
//! Each subcommand has its own module with a `run` function. Commands that
//! take files discover them before any request is made, then connect.

pub mod roi;
pub mod upload;
pub mod whoami;

use crate::api::{FailureMode, XnatClient};
use crate::config::Config;
use crate::discovery::{self, DicomFileRef};
use crate::error::Result;
use std::path::PathBuf;
use tracing::info;
use xnat_sync_common::dicom::FileDicomStore;

/// Authenticated connection to the archive
pub struct Session {
    pub client: XnatClient,
    pub username: String,
}

/// Build a client and probe the credentials; a failed probe is fatal.
pub async fn connect(config: &Config) -> Result<Session> {
    let client = XnatClient::from_config(config)?;
    let username = FailureMode::Quitter
        .apply(client.username().await)?
        .unwrap_or_default();

    info!(base_url = %client.base_url(), username = %username, "Authenticated");
    Ok(Session { client, username })
}

/// Discover one batch from the command-line inputs.
pub fn discover(files: &[PathBuf]) -> Result<Vec<DicomFileRef>> {
    discovery::discover(files, &FileDicomStore)
}

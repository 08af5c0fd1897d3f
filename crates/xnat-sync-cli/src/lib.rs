//! xnat-sync CLI Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Synchronizes local DICOM files with an XNAT archive.
//!
//! # Overview
//!
//! - **Discovery**: expand inputs into one single-study batch (`discovery`)
//! - **Gateway**: authenticated requests and failure policy (`api`)
//! - **Acquisition**: get-or-create for subjects, sessions and scans (`objects`)
//! - **Import wait**: pre-archive polling with a timeout (`poller`)
//! - **Upload**: classify, bulk import, store ROI collections (`pipeline`)

pub mod acquire;
pub mod api;
pub mod commands;
pub mod config;
pub mod discovery;
pub mod error;
pub mod objects;
pub mod pipeline;
pub mod poller;
pub mod report;
pub mod roi;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, SyncError};

use clap::{ArgAction, Args, Parser, Subcommand};
use pipeline::{ImportHandler, OverwriteMode};
use roi::RoiType;
use std::path::PathBuf;

/// xnat-sync - push DICOM studies and ROI collections to XNAT
#[derive(Parser, Debug)]
#[command(name = "xnat-sync")]
#[command(author, version, about, long_about = None)]
#[command(disable_help_flag = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Archive host (`name`, `name:port` or `scheme://name[:port]`)
    #[arg(short = 'h', long, global = true)]
    pub host: Option<String>,

    /// Username, overriding the credentials file
    #[arg(short = 'u', long, global = true)]
    pub username: Option<String>,

    /// Password, overriding the credentials file
    #[arg(short = 'p', long, global = true)]
    pub password: Option<String>,

    /// Port, overriding one given in the host
    #[arg(short = 'P', long, global = true)]
    pub port: Option<u16>,

    /// More output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Skip TLS certificate verification
    #[arg(long, global = true)]
    pub insecure: bool,

    /// Print help as markdown
    #[arg(long, hide = true)]
    pub markdown_help: bool,

    /// Print help
    #[arg(long, action = ArgAction::Help, global = true)]
    pub help: Option<bool>,
}

impl Cli {
    /// Environment configuration with command-line overrides applied.
    pub fn config(&self) -> Result<Config> {
        let mut config = Config::from_env()?;

        if let Some(ref host) = self.host {
            config.host = Some(host.clone());
        }
        if let Some(port) = self.port {
            config.port = Some(port);
        }
        if let Some(ref username) = self.username {
            config.username = Some(username.clone());
        }
        if let Some(ref password) = self.password {
            config.password = Some(password.clone());
        }
        if self.insecure {
            config.verify_tls = false;
        }

        config.poll.validate()?;
        Ok(config)
    }
}

/// Available commands
///
/// `-h` is the host everywhere, so every level disables the generated help
/// flag and relies on the global `--help`.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// ROI collection operations
    #[command(disable_help_flag = true)]
    Roi {
        #[command(subcommand)]
        command: RoiCommand,
    },

    /// Import a study and store its ROI collections
    #[command(disable_help_flag = true)]
    Upload(UploadArgs),

    /// Print the username the archive authenticates us as
    #[command(disable_help_flag = true)]
    Whoami,
}

#[derive(Subcommand, Debug)]
pub enum RoiCommand {
    /// Store ROI collections against an existing session
    #[command(disable_help_flag = true)]
    Store(RoiStoreArgs),
}

/// Options shared by commands that store collections
#[derive(Args, Debug, Clone)]
pub struct CollectionArgs {
    /// DICOM file or directory (repeatable)
    #[arg(short = 'f', long = "file")]
    pub files: Vec<PathBuf>,

    /// Collection label, instead of one derived from SeriesDescription
    #[arg(short, long)]
    pub label: Option<String>,

    /// ROI collection type to store
    #[arg(short = 't', long = "type", value_enum, default_value_t = RoiType::Seg)]
    pub roi: RoiType,

    /// Replace existing collections
    #[arg(short, long)]
    pub overwrite: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RoiStoreArgs {
    /// Project ID
    pub project: String,

    /// Session label
    pub session: String,

    #[command(flatten)]
    pub collection: CollectionArgs,
}

#[derive(Args, Debug, Clone)]
pub struct UploadArgs {
    /// Project ID
    pub project: String,

    /// Subject label
    pub subject: String,

    /// Session label
    pub session: String,

    #[command(flatten)]
    pub collection: CollectionArgs,

    /// Session xsiType when it has to be created (derived from Modality otherwise)
    #[arg(long)]
    pub xsi_type: Option<String>,

    /// Import handler for the plain image files
    #[arg(long, value_enum, default_value_t = ImportHandler::DicomZip)]
    pub handler: ImportHandler,

    /// Do not let the import service rename conflicting sessions
    #[arg(long)]
    pub no_rename: bool,

    /// What the import service does with existing data
    #[arg(long, value_enum)]
    pub import_overwrite: Option<OverwriteMode>,

    /// Quarantine the imported session
    #[arg(long)]
    pub quarantine: bool,
}

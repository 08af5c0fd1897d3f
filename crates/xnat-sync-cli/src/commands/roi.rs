//! `xnat-sync roi store` command implementation

use crate::commands::{connect, discover};
use crate::config::Config;
use crate::error::Result;
use crate::pipeline::{CollectionReport, CollectionTarget, UploadPipeline};
use crate::RoiStoreArgs;
use colored::Colorize;
use std::sync::Arc;
use xnat_sync_common::dicom::FileDicomStore;

/// Store ROI collections against an existing session
pub async fn store(config: &Config, args: &RoiStoreArgs) -> Result<()> {
    let files = discover(&args.collection.files)?;
    let session = connect(config).await?;

    let pipeline = UploadPipeline::new(
        Arc::new(session.client),
        Arc::new(FileDicomStore),
        config.poll.clone(),
    )?;
    let target = CollectionTarget {
        project: args.project.clone(),
        session: args.session.clone(),
        roi: args.collection.roi,
        overwrite: args.collection.overwrite,
        label: args.collection.label.clone(),
    };

    let report = pipeline.store_only(&target, files).await?;
    print_collections(&report);
    Ok(())
}

pub(crate) fn print_collections(report: &CollectionReport) {
    for label in &report.stored {
        println!("{} {}", "✓".green(), label);
    }
    for label in &report.failed {
        println!("{} {} (not stored)", "✗".red(), label);
    }
    if report.stored.is_empty() && report.failed.is_empty() {
        println!("No ROI collections of the requested type were found");
    }
}

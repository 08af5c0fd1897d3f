//! `xnat-sync upload` command implementation

use crate::commands::roi::print_collections;
use crate::commands::{connect, discover};
use crate::config::Config;
use crate::error::Result;
use crate::pipeline::{ImportHandler, ImportOptions, UploadPipeline, UploadRequest};
use crate::UploadArgs;
use colored::Colorize;
use std::sync::Arc;
use xnat_sync_common::dicom::FileDicomStore;

/// Import options as given on the command line.
///
/// The session importer takes no rename option, so it is only sent there
/// when explicitly asked for (and then rejected by validation).
pub fn import_options(args: &UploadArgs) -> ImportOptions {
    let rename = match args.handler {
        ImportHandler::SessionImporter => args.no_rename.then_some(false),
        _ => Some(!args.no_rename),
    };

    ImportOptions {
        handler: args.handler,
        rename,
        overwrite: args.import_overwrite,
        quarantine: args.quarantine,
    }
}

/// Run the full upload pipeline for one session
pub async fn run(config: &Config, args: &UploadArgs) -> Result<()> {
    let options = import_options(args);
    options.validate()?;
    let files = discover(&args.collection.files)?;
    let session = connect(config).await?;

    let pipeline = UploadPipeline::new(
        Arc::new(session.client),
        Arc::new(FileDicomStore),
        config.poll.clone(),
    )?;
    let request = UploadRequest {
        project: args.project.clone(),
        subject: args.subject.clone(),
        session: args.session.clone(),
        roi: args.collection.roi,
        overwrite: args.collection.overwrite,
        label: args.collection.label.clone(),
        xsi_type: args.xsi_type.clone(),
        import: options,
    };

    let report = pipeline.run(&request, files).await?;

    if report.import_submitted {
        let outcome = report
            .import_outcome
            .map(|o| o.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        println!(
            "{} Imported {} image file(s) ({})",
            "✓".green(),
            report.bulk_files,
            outcome
        );
    } else if report.bulk_files > 0 {
        println!(
            "{} Import of {} image file(s) was rejected",
            "!".yellow(),
            report.bulk_files
        );
    }
    print_collections(&report.collections);
    Ok(())
}

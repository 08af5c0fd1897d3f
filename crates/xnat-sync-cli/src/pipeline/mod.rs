//! Upload pipeline
//!
//! One batch, one session, run start to finish:
//! `Classify → BulkImport → AwaitImport → StoreCollections → Done`.
//!
//! Plain image files are zipped and handed to the import service; the
//! pipeline then waits for the archive to digest them so the ROI
//! collections stored afterwards can reference what was imported. Scratch
//! files (the archive and header-fixed copies) live in a temporary
//! directory dropped on every exit path.

pub mod collections;
pub mod import;
pub mod manifest;

pub use collections::{CollectionReport, CollectionTarget};
pub use import::{ImportHandler, ImportOptions, OverwriteMode};
pub use manifest::UploadManifest;

use crate::api::{FailureMode, XnatClient};
use crate::config::PollSettings;
use crate::discovery::DicomFileRef;
use crate::error::Result;
use crate::objects::{acquire_session, acquire_subject, CreateSpec};
use crate::poller::{ImportOutcome, ImportPoller, ImportTarget};
use crate::roi::RoiType;
use std::fmt;
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info, warn};
use xnat_sync_common::dicom::DicomStore;

/// Pipeline states, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Classify,
    BulkImport,
    AwaitImport,
    StoreCollections,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Classify => "classify",
            Stage::BulkImport => "bulk-import",
            Stage::AwaitImport => "await-import",
            Stage::StoreCollections => "store-collections",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Everything a full upload needs besides the files
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub project: String,
    pub subject: String,
    pub session: String,
    pub roi: RoiType,
    pub overwrite: bool,
    pub label: Option<String>,
    /// Session type when it has to be created; derived from the files otherwise
    pub xsi_type: Option<String>,
    pub import: ImportOptions,
}

impl UploadRequest {
    fn collection_target(&self) -> CollectionTarget {
        CollectionTarget {
            project: self.project.clone(),
            session: self.session.clone(),
            roi: self.roi,
            overwrite: self.overwrite,
            label: self.label.clone(),
        }
    }
}

/// Summary of one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub bulk_files: usize,
    pub skipped_files: usize,
    pub import_submitted: bool,
    pub import_outcome: Option<ImportOutcome>,
    pub collections: CollectionReport,
}

pub struct UploadPipeline {
    client: Arc<XnatClient>,
    store: Arc<dyn DicomStore>,
    poller: ImportPoller,
}

impl UploadPipeline {
    pub fn new(client: Arc<XnatClient>, store: Arc<dyn DicomStore>, poll: PollSettings) -> Result<Self> {
        Ok(Self {
            client,
            store,
            poller: ImportPoller::new(poll)?,
        })
    }

    /// Run every stage for `files`.
    pub async fn run(&self, request: &UploadRequest, files: Vec<DicomFileRef>) -> Result<UploadReport> {
        request.import.validate()?;
        let scratch = TempDir::new()?;

        enter(Stage::Classify);
        let manifest = UploadManifest::classify(files, request.roi);
        let mut report = UploadReport {
            bulk_files: manifest.bulk.len(),
            skipped_files: manifest.skipped.len(),
            ..Default::default()
        };

        let representative = manifest.bulk.first().or_else(|| manifest.collections.first());
        acquire_subject(&self.client, &request.project, &request.subject).await?;
        acquire_session(
            &self.client,
            &request.project,
            &request.subject,
            &request.session,
            &CreateSpec {
                xsi_type: request.xsi_type.as_deref(),
                representative,
            },
        )
        .await?;

        enter(Stage::BulkImport);
        if let Some(archive) = manifest.write_archive(scratch.path()).await? {
            report.import_submitted = import::submit(
                &self.client,
                &archive,
                &request.import,
                &request.project,
                &request.subject,
                &request.session,
            )
            .await?;
        } else {
            debug!("No plain image files, skipping bulk import");
        }

        if report.import_submitted {
            enter(Stage::AwaitImport);
            let target = ImportTarget {
                project: request.project.clone(),
                subject: request.subject.clone(),
                session: request.session.clone(),
            };
            let outcome = FailureMode::Quitter
                .apply(self.poller.wait(self.client.clone(), target).await)?;

            match outcome {
                Some(ImportOutcome::Completed) => info!("Bulk import completed"),
                Some(other) => warn!(outcome = %other, "Bulk import did not complete, continuing"),
                None => {}
            }
            report.import_outcome = outcome;
        }

        enter(Stage::StoreCollections);
        report.collections = collections::store_collections(
            &self.client,
            self.store.as_ref(),
            &request.collection_target(),
            &manifest.collections,
            scratch.path(),
        )
        .await?;

        enter(Stage::Done);
        info!(
            bulk = report.bulk_files,
            stored = report.collections.stored.len(),
            failed = report.collections.failed.len(),
            skipped = report.skipped_files,
            "Upload finished"
        );
        Ok(report)
    }

    /// StoreCollections alone, against a session that already exists.
    /// Plain image files in the batch are left out.
    pub async fn store_only(
        &self,
        target: &CollectionTarget,
        files: Vec<DicomFileRef>,
    ) -> Result<CollectionReport> {
        let scratch = TempDir::new()?;
        let manifest = UploadManifest::classify(files, target.roi);
        if manifest.has_bulk() {
            debug!(count = manifest.bulk.len(), "Ignoring plain image files");
        }

        enter(Stage::StoreCollections);
        let report = collections::store_collections(
            &self.client,
            self.store.as_ref(),
            target,
            &manifest.collections,
            scratch.path(),
        )
        .await?;

        enter(Stage::Done);
        info!(
            stored = report.stored.len(),
            failed = report.failed.len(),
            "Collection store finished"
        );
        Ok(report)
    }
}

fn enter(stage: Stage) {
    debug!(%stage, "Entering stage");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::BulkImport.to_string(), "bulk-import");
        assert_eq!(Stage::Done.to_string(), "done");
    }
}

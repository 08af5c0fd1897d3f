//! Import-service options and submission

use crate::api::{endpoints, FailureMode, XnatClient};
use crate::error::{Result, SyncError};
use clap::ValueEnum;
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

/// Server-side import handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ImportHandler {
    #[default]
    #[value(name = "DICOM-zip")]
    DicomZip,
    #[value(name = "gradual-DICOM")]
    GradualDicom,
    #[value(name = "SI")]
    SessionImporter,
}

impl ImportHandler {
    pub fn as_str(self) -> &'static str {
        match self {
            ImportHandler::DicomZip => "DICOM-zip",
            ImportHandler::GradualDicom => "gradual-DICOM",
            ImportHandler::SessionImporter => "SI",
        }
    }

    fn accepts_rename(self) -> bool {
        matches!(self, ImportHandler::DicomZip | ImportHandler::GradualDicom)
    }

    fn accepts_overwrite(self) -> bool {
        matches!(self, ImportHandler::DicomZip | ImportHandler::SessionImporter)
    }

    fn accepts_quarantine(self) -> bool {
        self == ImportHandler::SessionImporter
    }
}

impl fmt::Display for ImportHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the import service does with data that already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OverwriteMode {
    None,
    Append,
    Delete,
}

impl OverwriteMode {
    pub fn as_str(self) -> &'static str {
        match self {
            OverwriteMode::None => "none",
            OverwriteMode::Append => "append",
            OverwriteMode::Delete => "delete",
        }
    }
}

/// Handler plus its handler-specific options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOptions {
    pub handler: ImportHandler,
    pub rename: Option<bool>,
    pub overwrite: Option<OverwriteMode>,
    pub quarantine: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            handler: ImportHandler::DicomZip,
            rename: Some(true),
            overwrite: None,
            quarantine: false,
        }
    }
}

impl ImportOptions {
    /// Reject options the chosen handler does not take.
    pub fn validate(&self) -> Result<()> {
        let reject = |option: &str| {
            Err(SyncError::validation(format!(
                "import handler {} does not accept the '{}' option",
                self.handler, option
            )))
        };

        if self.rename.is_some() && !self.handler.accepts_rename() {
            return reject("rename");
        }
        if self.overwrite.is_some() && !self.handler.accepts_overwrite() {
            return reject("overwrite");
        }
        if self.quarantine && !self.handler.accepts_quarantine() {
            return reject("quarantine");
        }
        Ok(())
    }

    /// Full import-service query for one session.
    pub fn query(&self, project: &str, subject: &str, session: &str) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("import-handler", self.handler.as_str().to_string()),
            ("inbody", "true".to_string()),
            ("PROJECT_ID", project.to_string()),
            ("SUBJECT_ID", subject.to_string()),
            ("EXPT_LABEL", session.to_string()),
        ];

        if let Some(rename) = self.rename {
            query.push(("rename", rename.to_string()));
        }
        if let Some(overwrite) = self.overwrite {
            query.push(("overwrite", overwrite.as_str().to_string()));
        }
        if self.quarantine {
            query.push(("quarantine", "true".to_string()));
        }
        query
    }
}

/// POST `archive` to the import service.
///
/// Returns whether the archive accepted the submission. A rejection is
/// logged and tolerated, since the files may already be there; a transport
/// failure is fatal.
pub async fn submit(
    client: &XnatClient,
    archive: &Path,
    options: &ImportOptions,
    project: &str,
    subject: &str,
    session: &str,
) -> Result<bool> {
    options.validate()?;
    let bytes = tokio::fs::metadata(archive).await?.len();
    let query = options.query(project, subject, session);
    let path = endpoints::import_path();

    info!(bytes, handler = %options.handler, "Submitting bulk import");
    match FailureMode::Raise.apply(client.post_file(&path, &query, archive, "application/zip").await) {
        Ok(_) => Ok(true),
        Err(err) if err.is_status() => {
            warn!(error = %err, "Import service rejected the archive, continuing");
            Ok(false)
        }
        Err(err) => FailureMode::Quitter.apply::<bool>(Err(err)).map(|_| false),
    }
}

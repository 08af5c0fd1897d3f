//! Input discovery
//!
//! Expands the paths given on the command line into DICOM files, loads the
//! handful of attributes the sync engine needs, and enforces the batch
//! invariants before anything touches the network.

use crate::error::{Result, SyncError};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use walkdir::WalkDir;
use xnat_sync_common::dicom::{DicomKey, DicomStore};

/// Attributes loaded for every discovered file
pub const METADATA_KEYWORDS: [&str; 10] = [
    "Modality",
    "SOPClassUID",
    "SeriesInstanceUID",
    "SeriesDescription",
    "SeriesNumber",
    "PatientID",
    "StudyInstanceUID",
    "StudyDate",
    "SoftwareVersions",
    "StudyID",
];

/// A DICOM file plus the metadata read from it at discovery time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DicomFileRef {
    pub path: PathBuf,
    fields: BTreeMap<String, String>,
}

impl DicomFileRef {
    /// Read [`METADATA_KEYWORDS`] from `path` in one pass.
    pub fn load(path: impl Into<PathBuf>, store: &dyn DicomStore) -> Result<Self> {
        let path = path.into();
        let keys = METADATA_KEYWORDS.map(DicomKey::name);
        let values = store.read_fields(&path, &keys)?;

        let fields = METADATA_KEYWORDS
            .into_iter()
            .zip(values)
            .filter_map(|(keyword, value)| value.map(|v| (keyword.to_string(), v)))
            .collect();
        Ok(Self { path, fields })
    }

    /// Build from already-known values.
    pub fn from_fields<'a>(
        path: impl Into<PathBuf>,
        fields: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        Self {
            path: path.into(),
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn get(&self, keyword: &str) -> Option<&str> {
        self.fields.get(keyword).map(String::as_str)
    }

    pub fn modality(&self) -> Option<&str> {
        self.get("Modality")
    }

    pub fn study_instance_uid(&self) -> Option<&str> {
        self.get("StudyInstanceUID")
    }

    pub fn series_instance_uid(&self) -> Option<&str> {
        self.get("SeriesInstanceUID")
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image.dcm".to_string())
    }
}

/// Expand `paths` into DICOM files, in discovery order.
///
/// In strict mode a path named directly must be a DICOM file; non-DICOM
/// files met while walking a directory are skipped either way.
pub fn find_files(paths: &[PathBuf], store: &dyn DicomStore, strict: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).sort_by_file_name() {
                let entry = entry.map_err(|e| SyncError::Io(e.into()))?;
                if entry.file_type().is_file() && store.is_dicom(entry.path()) {
                    files.push(entry.into_path());
                } else if entry.file_type().is_file() {
                    trace!(path = %entry.path().display(), "Skipping non-DICOM file");
                }
            }
        } else if store.is_dicom(path) {
            files.push(path.clone());
        } else if strict {
            return Err(not_dicom(path, store));
        }
    }

    debug!(count = files.len(), "Discovered DICOM files");
    Ok(files)
}

fn not_dicom(path: &Path, store: &dyn DicomStore) -> SyncError {
    if store.is_zip(path) {
        SyncError::validation(format!(
            "{} is a zip archive; extract it and pass the directory instead",
            path.display()
        ))
    } else {
        SyncError::validation(format!("{} is not a valid DICOM image file", path.display()))
    }
}

/// Reject batches spanning more than one study.
pub fn ensure_single_study(files: &[DicomFileRef]) -> Result<()> {
    let studies: BTreeSet<&str> = files
        .iter()
        .map(|f| f.study_instance_uid().unwrap_or(""))
        .collect();

    if studies.len() > 1 {
        return Err(SyncError::validation(format!(
            "files span {} studies ({}); one batch must share a single StudyInstanceUID",
            studies.len(),
            studies.into_iter().collect::<Vec<_>>().join(", ")
        )));
    }
    Ok(())
}

/// Find, load and validate one batch.
pub fn discover(paths: &[PathBuf], store: &dyn DicomStore) -> Result<Vec<DicomFileRef>> {
    let files = find_files(paths, store, true)?;
    if files.is_empty() {
        return Err(SyncError::validation("no files were provided"));
    }

    let files = files
        .into_iter()
        .map(|path| DicomFileRef::load(path, store))
        .collect::<Result<Vec<_>>>()?;

    ensure_single_study(&files)?;
    Ok(files)
}

//! ROI collection storage
//!
//! Each file is pushed from a scratch copy so header fixes never touch the
//! caller's data. A failed push is logged and the batch moves on.

use crate::api::{endpoints, FailureMode, XnatClient};
use crate::discovery::DicomFileRef;
use crate::error::Result;
use crate::roi::RoiType;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use xnat_sync_common::dicom::{DicomKey, DicomStore};

/// Value written into required headers that are blank or absent
pub const PLACEHOLDER: &str = "Unknown";

/// Headers the collection store requires, with their value representation
const REQUIRED_HEADERS: [(&str, &str); 2] = [("SoftwareVersions", "LO"), ("StudyID", "SH")];

/// Fill blank or absent required headers of `path` in place.
///
/// Returns the keywords that were rewritten. A header that already holds a
/// value, the placeholder included, is left alone.
pub fn normalize(path: &Path, store: &dyn DicomStore) -> Result<Vec<&'static str>> {
    let mut rewritten = Vec::new();

    for (keyword, vr) in REQUIRED_HEADERS {
        let key = DicomKey::name(keyword);
        let current = store.read_field(path, &key)?;
        if current.as_deref().is_none_or(|v| v.trim().is_empty()) {
            store.write_field(path, &key, vr, PLACEHOLDER)?;
            rewritten.push(keyword);
        }
    }

    if !rewritten.is_empty() {
        debug!(path = %path.display(), fields = ?rewritten, "Filled required headers");
    }
    Ok(rewritten)
}

/// Collection label: SeriesDescription with spaces as underscores and the
/// patient ID swapped for the session label.
pub fn collection_label(file: &DicomFileRef, session_label: &str) -> String {
    let description = file
        .get("SeriesDescription")
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .or_else(|| file.series_instance_uid())
        .map(str::to_string)
        .unwrap_or_else(|| file.file_name());

    let label = match file.get("PatientID").map(str::trim) {
        Some(patient) if !patient.is_empty() => description.replace(patient, session_label),
        _ => description,
    };
    label.replace(' ', "_")
}

/// Where and how collections are stored
#[derive(Debug, Clone)]
pub struct CollectionTarget {
    pub project: String,
    pub session: String,
    pub roi: RoiType,
    pub overwrite: bool,
    /// Overrides the derived label for every file
    pub label: Option<String>,
}

/// What happened to each collection file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionReport {
    pub stored: Vec<String>,
    pub failed: Vec<String>,
}

/// Push `files` in order, each from a copy made under `scratch`.
pub async fn store_collections(
    client: &XnatClient,
    store: &dyn DicomStore,
    target: &CollectionTarget,
    files: &[DicomFileRef],
    scratch: &Path,
) -> Result<CollectionReport> {
    let mut report = CollectionReport::default();

    for (index, file) in files.iter().enumerate() {
        let copy = scratch_copy(file, scratch, index).await?;
        normalize(&copy, store)?;

        let label = target
            .label
            .clone()
            .unwrap_or_else(|| collection_label(file, &target.session));
        let path = endpoints::roi_collection_path(&target.project, &target.session, &label);
        let query = [
            ("overwrite", target.overwrite.to_string()),
            ("type", target.roi.as_str().to_string()),
            (
                "seriesuid",
                file.series_instance_uid().unwrap_or_default().to_string(),
            ),
        ];

        let body = tokio::fs::read(&copy).await?;
        let stored = FailureMode::Ignore
            .apply(
                client
                    .put_bytes(&path, &query, body, "application/octet-stream")
                    .await,
            )?
            .is_some();

        if stored {
            info!(label = %label, roi = %target.roi, "Stored ROI collection");
            report.stored.push(label);
        } else {
            warn!(label = %label, path = %file.path.display(), "Failed to store ROI collection");
            report.failed.push(label);
        }
    }

    Ok(report)
}

async fn scratch_copy(file: &DicomFileRef, scratch: &Path, index: usize) -> Result<PathBuf> {
    let copy = scratch.join(format!("{:05}_{}", index, file.file_name()));
    tokio::fs::copy(&file.path, &copy).await?;
    Ok(copy)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use xnat_sync_common::dicom::testing::Fixture;
    use xnat_sync_common::dicom::FileDicomStore;

    fn software_versions(path: &Path) -> Option<String> {
        FileDicomStore
            .read_field(path, &DicomKey::name("SoftwareVersions"))
            .unwrap()
    }

    #[test]
    fn test_label_from_description() {
        let file = DicomFileRef::from_fields(
            "seg.dcm",
            [("SeriesDescription", "Tumor Outline"), ("PatientID", "PAT01")],
        );
        assert_eq!(collection_label(&file, "S"), "Tumor_Outline");
    }

    #[test]
    fn test_label_replaces_patient_id() {
        let file = DicomFileRef::from_fields(
            "seg.dcm",
            [("SeriesDescription", "PAT01 liver seg"), ("PatientID", "PAT01")],
        );
        assert_eq!(collection_label(&file, "SESSION_7"), "SESSION_7_liver_seg");
    }

    #[test]
    fn test_label_replaces_patient_id_containing_spaces() {
        let file = DicomFileRef::from_fields(
            "seg.dcm",
            [("SeriesDescription", "John Doe liver"), ("PatientID", "John Doe")],
        );
        assert_eq!(collection_label(&file, "S"), "S_liver");
    }

    #[test]
    fn test_label_falls_back_to_series_uid() {
        let file = DicomFileRef::from_fields("seg.dcm", [("SeriesInstanceUID", "1.2.3")]);
        assert_eq!(collection_label(&file, "S"), "1.2.3");
    }

    #[test]
    fn test_normalize_fills_blank_headers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("seg.dcm");
        Fixture {
            software_versions: Some(String::new()),
            study_id: None,
            ..Fixture::seg()
        }
        .write(&path);

        let rewritten = normalize(&path, &FileDicomStore).unwrap();
        assert_eq!(rewritten, vec!["SoftwareVersions", "StudyID"]);
        assert_eq!(software_versions(&path).as_deref(), Some(PLACEHOLDER));
    }

    #[test]
    fn test_normalize_keeps_existing_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ct.dcm");
        Fixture {
            study_id: Some(PLACEHOLDER.to_string()),
            ..Fixture::ct()
        }
        .write(&path);

        assert!(normalize(&path, &FileDicomStore).unwrap().is_empty());
        assert_eq!(software_versions(&path).as_deref(), Some("scanner 1.0"));
    }

    #[tokio::test]
    async fn test_store_uses_scratch_copy_and_continues_past_failures() {
        let dir = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();

        let first = dir.path().join("first.dcm");
        Fixture {
            software_versions: Some(String::new()),
            ..Fixture::seg()
        }
        .write(&first);
        let original = std::fs::read(&first).unwrap();
        let second = dir.path().join("second.dcm");
        Fixture {
            series_description: "Lung Mask".to_string(),
            series_instance_uid: "1.2.4".to_string(),
            ..Fixture::seg()
        }
        .write(&second);

        let files = vec![
            DicomFileRef::load(&first, &FileDicomStore).unwrap(),
            DicomFileRef::load(&second, &FileDicomStore).unwrap(),
        ];

        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/xapi/roi/projects/P/sessions/S/collections/Tumor_Outline"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/xapi/roi/projects/P/sessions/S/collections/Lung_Mask"))
            .and(query_param("seriesuid", "1.2.4"))
            .and(query_param("type", "SEG"))
            .and(query_param("overwrite", "true"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = XnatClient::new(server.uri(), None).unwrap();
        let target = CollectionTarget {
            project: "P".to_string(),
            session: "S".to_string(),
            roi: RoiType::Seg,
            overwrite: true,
            label: None,
        };

        let report = store_collections(&client, &FileDicomStore, &target, &files, scratch.path())
            .await
            .unwrap();

        assert_eq!(report.failed, vec!["Tumor_Outline"]);
        assert_eq!(report.stored, vec!["Lung_Mask"]);
        assert_eq!(std::fs::read(&first).unwrap(), original);
    }
}

//! Subject, session and scan acquisition
//!
//! Each entity is read through the gateway and created on first reference
//! via [`crate::acquire::acquire`]. Creation parameters are lifted from a
//! representative DICOM file when one is supplied.

use crate::acquire::acquire;
use crate::api::{endpoints, FailureMode, ObjectKind, RemoteObjectRef, XnatClient};
use crate::discovery::DicomFileRef;
use crate::error::{Result, SyncError};
use chrono::NaiveDate;
use tracing::info;

/// What a creation call may draw on
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateSpec<'a> {
    /// Explicit type discriminator, e.g. `xnat:ctSessionData`
    pub xsi_type: Option<&'a str>,
    /// File whose attributes describe the object
    pub representative: Option<&'a DicomFileRef>,
}

impl<'a> CreateSpec<'a> {
    pub fn from_file(file: &'a DicomFileRef) -> Self {
        Self {
            xsi_type: None,
            representative: Some(file),
        }
    }
}

/// Schema prefix the archive uses for a modality's data types.
fn modality_prefix(modality: &str) -> &'static str {
    match modality.to_ascii_uppercase().as_str() {
        "CT" => "ct",
        "MR" => "mr",
        "PT" => "pet",
        "US" => "us",
        "CR" => "cr",
        "DX" => "dx",
        "MG" => "mg",
        "NM" => "nm",
        "XA" => "xa",
        "RF" => "rf",
        _ => "otherDicom",
    }
}

pub fn session_xsi_type(modality: &str) -> String {
    format!("xnat:{}SessionData", modality_prefix(modality))
}

pub fn scan_xsi_type(modality: &str) -> String {
    format!("xnat:{}ScanData", modality_prefix(modality))
}

/// Human-readable series class for common SOP classes.
pub fn series_class(sop_class_uid: &str) -> String {
    let name = match sop_class_uid {
        "1.2.840.10008.5.1.4.1.1.2" => "CT Image Storage",
        "1.2.840.10008.5.1.4.1.1.2.1" => "Enhanced CT Image Storage",
        "1.2.840.10008.5.1.4.1.1.4" => "MR Image Storage",
        "1.2.840.10008.5.1.4.1.1.4.1" => "Enhanced MR Image Storage",
        "1.2.840.10008.5.1.4.1.1.128" => "Positron Emission Tomography Image Storage",
        "1.2.840.10008.5.1.4.1.1.6.1" => "Ultrasound Image Storage",
        "1.2.840.10008.5.1.4.1.1.7" => "Secondary Capture Image Storage",
        "1.2.840.10008.5.1.4.1.1.66.4" => "Segmentation Storage",
        "1.2.840.10008.5.1.4.1.1.481.3" => "RT Structure Set Storage",
        other => other,
    };
    name.to_string()
}

fn resolve_xsi_type(spec: &CreateSpec<'_>, kind: ObjectKind) -> Result<String> {
    if let Some(xsi) = spec.xsi_type {
        return Ok(xsi.to_string());
    }

    let file = spec.representative.ok_or_else(|| {
        SyncError::config(format!(
            "creating a {} requires an xsiType or a representative DICOM file",
            kind
        ))
    })?;
    let modality = file.modality().unwrap_or("OT");

    Ok(match kind {
        ObjectKind::Scan => scan_xsi_type(modality),
        _ => session_xsi_type(modality),
    })
}

/// Query parameters for creating a session.
pub fn session_params(spec: &CreateSpec<'_>) -> Result<Vec<(String, String)>> {
    let xsi = resolve_xsi_type(spec, ObjectKind::Session)?;
    let mut params = vec![("xsiType".to_string(), xsi.clone())];

    if let Some(file) = spec.representative {
        if let Some(date) = file.get("StudyDate").and_then(iso_date) {
            params.push((format!("{}/date", xsi), date));
        }
        if let Some(modality) = file.modality() {
            params.push((format!("{}/modality", xsi), modality.to_string()));
        }
    }

    Ok(params)
}

/// Query parameters for creating a scan.
pub fn scan_params(spec: &CreateSpec<'_>) -> Result<Vec<(String, String)>> {
    let xsi = resolve_xsi_type(spec, ObjectKind::Scan)?;
    let mut params = vec![("xsiType".to_string(), xsi.clone())];

    if let Some(file) = spec.representative {
        let fields = [
            ("UID", file.series_instance_uid().map(str::to_string)),
            ("series_description", file.get("SeriesDescription").map(str::to_string)),
            ("modality", file.modality().map(str::to_string)),
            ("series_class", file.get("SOPClassUID").map(series_class)),
        ];
        for (name, value) in fields {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                params.push((format!("{}/{}", xsi, name), value));
            }
        }
    }

    Ok(params)
}

fn iso_date(dicom_date: &str) -> Option<String> {
    NaiveDate::parse_from_str(dicom_date.trim(), "%Y%m%d")
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

fn as_query(params: &[(String, String)]) -> Vec<(&str, String)> {
    params.iter().map(|(k, v)| (k.as_str(), v.clone())).collect()
}

async fn read(client: &XnatClient, kind: ObjectKind, path: &str) -> Result<RemoteObjectRef> {
    let fields = client.get_fields(path).await?;
    Ok(RemoteObjectRef::from_fields(kind, fields))
}

async fn create(client: &XnatClient, kind: ObjectKind, path: &str, params: &[(String, String)]) -> Result<()> {
    info!(%kind, path, "Creating remote object");
    FailureMode::Quitter.apply(client.put(path, &as_query(params)).await)?;
    Ok(())
}

pub async fn acquire_subject(
    client: &XnatClient,
    project: &str,
    subject: &str,
) -> Result<RemoteObjectRef> {
    let path = endpoints::subject_path(project, subject);
    acquire(
        || read(client, ObjectKind::Subject, &path),
        || create(client, ObjectKind::Subject, &path, &[]),
    )
    .await
}

pub async fn acquire_session(
    client: &XnatClient,
    project: &str,
    subject: &str,
    session: &str,
    spec: &CreateSpec<'_>,
) -> Result<RemoteObjectRef> {
    let path = endpoints::experiment_path(project, subject, session);
    acquire(
        || read(client, ObjectKind::Session, &path),
        || async {
            let params = session_params(spec)?;
            create(client, ObjectKind::Session, &path, &params).await
        },
    )
    .await
}

/// Acquire a scan; `scan_id` defaults to the representative's SeriesNumber.
pub async fn acquire_scan(
    client: &XnatClient,
    project: &str,
    subject: &str,
    session: &str,
    scan_id: Option<&str>,
    spec: &CreateSpec<'_>,
) -> Result<RemoteObjectRef> {
    let scan_id = scan_id
        .or_else(|| spec.representative.and_then(|f| f.get("SeriesNumber")))
        .ok_or_else(|| {
            SyncError::config("a scan ID or a representative file with a SeriesNumber is required")
        })?;

    let path = endpoints::scan_path(project, subject, session, scan_id);
    acquire(
        || read(client, ObjectKind::Scan, &path),
        || async {
            let params = scan_params(spec)?;
            create(client, ObjectKind::Scan, &path, &params).await
        },
    )
    .await
}

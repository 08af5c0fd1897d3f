//! Archive endpoint paths
//!
//! Paths are relative to the base URL; every caller-supplied segment is
//! percent-encoded.

use urlencoding::encode;

/// Authentication probe
pub fn username_path() -> String {
    "/xapi/users/username".to_string()
}

pub fn subject_path(project: &str, subject: &str) -> String {
    format!(
        "/data/projects/{}/subjects/{}",
        encode(project),
        encode(subject)
    )
}

pub fn experiment_path(project: &str, subject: &str, session: &str) -> String {
    format!("{}/experiments/{}", subject_path(project, subject), encode(session))
}

pub fn scan_path(project: &str, subject: &str, session: &str, scan: &str) -> String {
    format!(
        "{}/scans/{}",
        experiment_path(project, subject, session),
        encode(scan)
    )
}

/// Pre-archive listing for a project
pub fn prearchive_path(project: &str) -> String {
    format!("/data/prearchive/projects/{}", encode(project))
}

/// Import service
pub fn import_path() -> String {
    "/data/services/import".to_string()
}

/// ROI collection store
pub fn roi_collection_path(project: &str, session: &str, label: &str) -> String {
    format!(
        "/xapi/roi/projects/{}/sessions/{}/collections/{}",
        encode(project),
        encode(session),
        encode(label)
    )
}

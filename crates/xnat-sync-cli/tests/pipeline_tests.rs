//! End-to-end upload pipeline tests against a mock archive

use serde_json::json;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};
use xnat_sync_cli::api::XnatClient;
use xnat_sync_cli::config::PollSettings;
use xnat_sync_cli::discovery::discover;
use xnat_sync_cli::pipeline::{ImportOptions, UploadPipeline, UploadRequest};
use xnat_sync_cli::poller::ImportOutcome;
use xnat_sync_cli::roi::RoiType;
use xnat_sync_common::dicom::testing::Fixture;
use xnat_sync_common::dicom::FileDicomStore;

/// One SEG and two CT files from the same study
fn write_batch(dir: &TempDir) -> PathBuf {
    let inputs = dir.path().join("study");
    std::fs::create_dir(&inputs).unwrap();
    Fixture::ct().write(&inputs.join("ct-001.dcm"));
    Fixture {
        series_number: "2".to_string(),
        ..Fixture::ct()
    }
    .write(&inputs.join("ct-002.dcm"));
    Fixture::seg().write(&inputs.join("seg.dcm"));
    inputs
}

fn object(id: &str, label: &str) -> serde_json::Value {
    json!({"items": [{"data_fields": {"ID": id, "label": label, "project": "P"}}]})
}

fn request() -> UploadRequest {
    UploadRequest {
        project: "P".to_string(),
        subject: "S1".to_string(),
        session: "S".to_string(),
        roi: RoiType::Seg,
        overwrite: false,
        label: None,
        xsi_type: None,
        import: ImportOptions::default(),
    }
}

fn poll_settings() -> PollSettings {
    PollSettings {
        timeout: Duration::from_secs(5),
        report_interval: Duration::from_secs(1),
        ..Default::default()
    }
}

async fn mount_existing_objects(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/data/projects/P/subjects/S1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(object("XNAT_S01", "S1")))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data/projects/P/subjects/S1/experiments/S"))
        .respond_with(ResponseTemplate::new(200).set_body_json(object("XNAT_E01", "S")))
        .mount(server)
        .await;
}

async fn mount_collection_store(server: &MockServer) {
    Mock::given(method("PUT"))
        .and(path("/xapi/roi/projects/P/sessions/S/collections/Tumor_Outline"))
        .and(query_param("seriesuid", "1.2.3"))
        .and(query_param("type", "SEG"))
        .and(query_param("overwrite", "false"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(server)
        .await;
}

fn pipeline(server: &MockServer) -> UploadPipeline {
    let client = XnatClient::new(server.uri(), None).unwrap();
    UploadPipeline::new(Arc::new(client), Arc::new(FileDicomStore), poll_settings()).unwrap()
}

#[tokio::test]
async fn test_seg_and_two_ct_files() {
    let dir = TempDir::new().unwrap();
    let inputs = write_batch(&dir);
    let files = discover(&[inputs], &FileDicomStore).unwrap();
    assert_eq!(files.len(), 3);

    let server = MockServer::start().await;
    mount_existing_objects(&server).await;
    Mock::given(method("POST"))
        .and(path("/data/services/import"))
        .and(query_param("import-handler", "DICOM-zip"))
        .and(query_param("inbody", "true"))
        .and(query_param("PROJECT_ID", "P"))
        .and(query_param("SUBJECT_ID", "S1"))
        .and(query_param("EXPT_LABEL", "S"))
        .respond_with(ResponseTemplate::new(200).set_body_string("/data/prearchive/projects/P/x/S"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data/prearchive/projects/P"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ResultSet": {"Result": []}})))
        .expect(1)
        .mount(&server)
        .await;
    mount_collection_store(&server).await;

    let report = pipeline(&server).run(&request(), files).await.unwrap();

    assert_eq!(report.bulk_files, 2);
    assert!(report.import_submitted);
    assert_eq!(report.import_outcome, Some(ImportOutcome::Completed));
    assert_eq!(report.collections.stored, vec!["Tumor_Outline"]);

    let requests = server.received_requests().await.unwrap();
    let import = requests
        .iter()
        .find(|r| r.method.as_str() == "POST")
        .expect("import request");
    let archive = zip::ZipArchive::new(Cursor::new(import.body.clone())).unwrap();
    assert_eq!(archive.len(), 2);
}

#[tokio::test]
async fn test_rejected_import_skips_wait_and_still_stores() {
    let dir = TempDir::new().unwrap();
    let files = discover(&[write_batch(&dir)], &FileDicomStore).unwrap();

    let server = MockServer::start().await;
    mount_existing_objects(&server).await;
    Mock::given(method("POST"))
        .and(path("/data/services/import"))
        .respond_with(ResponseTemplate::new(409).set_body_string("session already exists"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data/prearchive/projects/P"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ResultSet": {"Result": []}})))
        .expect(0)
        .mount(&server)
        .await;
    mount_collection_store(&server).await;

    let report = pipeline(&server).run(&request(), files).await.unwrap();

    assert!(!report.import_submitted);
    assert_eq!(report.import_outcome, None);
    assert_eq!(report.collections.stored.len(), 1);
}

#[tokio::test]
async fn test_roi_only_batch_skips_import() {
    let dir = TempDir::new().unwrap();
    let seg = dir.path().join("seg.dcm");
    Fixture::seg().write(&seg);
    let files = discover(&[seg], &FileDicomStore).unwrap();

    let server = MockServer::start().await;
    mount_existing_objects(&server).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    mount_collection_store(&server).await;

    let report = pipeline(&server).run(&request(), files).await.unwrap();
    assert_eq!(report.bulk_files, 0);
    assert!(!report.import_submitted);
}

#[tokio::test]
async fn test_missing_session_is_created_from_image_files() {
    let dir = TempDir::new().unwrap();
    let files = discover(&[write_batch(&dir)], &FileDicomStore).unwrap();

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/projects/P/subjects/S1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(object("XNAT_S01", "S1")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data/projects/P/subjects/S1/experiments/S"))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/data/projects/P/subjects/S1/experiments/S"))
        .and(query_param("xsiType", "xnat:ctSessionData"))
        .and(query_param("xnat:ctSessionData/date", "2024-01-31"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data/projects/P/subjects/S1/experiments/S"))
        .respond_with(ResponseTemplate::new(200).set_body_json(object("XNAT_E01", "S")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/data/services/import"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data/prearchive/projects/P"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ResultSet": {"Result": []}})))
        .mount(&server)
        .await;
    mount_collection_store(&server).await;

    pipeline(&server).run(&request(), files).await.unwrap();
}

#[tokio::test]
async fn test_invalid_import_options_send_nothing() {
    let dir = TempDir::new().unwrap();
    let files = discover(&[write_batch(&dir)], &FileDicomStore).unwrap();
    let server = MockServer::start().await;

    let mut request = request();
    request.import.quarantine = true;

    assert!(pipeline(&server).run(&request, files).await.is_err());
    assert!(server.received_requests().await.unwrap().is_empty());
}

//! REST gateway for the archive
//!
//! One authenticated request per call. Non-2xx answers come back as
//! [`SyncError::Status`], failures without an answer as
//! [`SyncError::Transport`]; call sites decide what to do with them through
//! [`crate::api::classify::FailureMode`].

use crate::api::classify::{request_failure, status_failure};
use crate::api::endpoints;
use crate::api::types::{
    ItemsEnvelope, ObjectFields, PreArchiveRecord, PreArchiveRow, ResultSetEnvelope,
};
use crate::config::{Config, DEFAULT_REQUEST_TIMEOUT_SECS};
use crate::error::{Result, SyncError};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Body, Client, Method, Response};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::debug;
use xnat_sync_common::credentials::Credentials;

/// Query parameters as sent on the wire
pub type Query<'a> = [(&'a str, String)];

/// Authenticated archive client
#[derive(Debug, Clone)]
pub struct XnatClient {
    client: Client,
    base_url: String,
    credentials: Option<Credentials>,
}

impl XnatClient {
    /// Client with default timeout and certificate verification
    pub fn new(base_url: impl Into<String>, credentials: Option<Credentials>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            credentials,
        })
    }

    /// Client built from resolved configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url()?,
            credentials: config.credentials()?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &Query<'_>,
        body: Option<(Body, &'static str)>,
    ) -> Result<Response> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method.clone(), &url).query(query);

        if let Some(ref credentials) = self.credentials {
            request = request.basic_auth(&credentials.login, Some(&credentials.password));
        }

        if let Some((body, content_type)) = body {
            request = request.header(CONTENT_TYPE, content_type).body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| request_failure(&method, path, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_failure(&method, path, status, body));
        }

        debug!(method = %method, path, status = status.as_u16(), "Request succeeded");
        Ok(response)
    }

    /// GET returning the raw body text
    pub async fn get_text(&self, path: &str, query: &Query<'_>) -> Result<String> {
        let response = self.send(Method::GET, path, query, None).await?;
        response
            .text()
            .await
            .map_err(|e| request_failure(&Method::GET, path, e))
    }

    /// GET returning a decoded JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &Query<'_>) -> Result<T> {
        let text = self.get_text(path, query).await?;
        serde_json::from_str(&text).map_err(|e| SyncError::Decode {
            path: path.to_string(),
            message: e.to_string(),
        })
    }

    /// Read one object and return its field mapping.
    ///
    /// The archive wraps object reads in a one-element `items` envelope;
    /// anything else is a decode failure.
    pub async fn get_fields(&self, path: &str) -> Result<ObjectFields> {
        let envelope: ItemsEnvelope = self
            .get_json(path, &[("format", "json".to_string())])
            .await?;

        let count = envelope.items.len();
        let mut items = envelope.items.into_iter();
        match (items.next(), count) {
            (Some(item), 1) => Ok(item.data_fields),
            _ => Err(SyncError::Decode {
                path: path.to_string(),
                message: format!("expected exactly one item, got {}", count),
            }),
        }
    }

    /// PUT without a body (object creation)
    pub async fn put(&self, path: &str, query: &Query<'_>) -> Result<()> {
        self.send(Method::PUT, path, query, None).await?;
        Ok(())
    }

    /// PUT with a binary body
    pub async fn put_bytes(
        &self,
        path: &str,
        query: &Query<'_>,
        body: Vec<u8>,
        content_type: &'static str,
    ) -> Result<()> {
        self.send(Method::PUT, path, query, Some((Body::from(body), content_type)))
            .await?;
        Ok(())
    }

    /// POST the contents of `file`, returning the response text.
    ///
    /// The file is streamed in chunks rather than read into memory.
    pub async fn post_file(
        &self,
        path: &str,
        query: &Query<'_>,
        file: &Path,
        content_type: &'static str,
    ) -> Result<String> {
        let file = tokio::fs::File::open(file).await?;
        let body = Body::wrap_stream(ReaderStream::new(file));
        let response = self
            .send(Method::POST, path, query, Some((body, content_type)))
            .await?;
        response
            .text()
            .await
            .map_err(|e| request_failure(&Method::POST, path, e))
    }

    /// Authentication probe: the username the archive sees us as
    pub async fn username(&self) -> Result<String> {
        let name = self.get_text(&endpoints::username_path(), &[]).await?;
        Ok(name.trim().to_string())
    }

    /// Pre-archive entries of `project`
    pub async fn prearchive(&self, project: &str) -> Result<Vec<PreArchiveRecord>> {
        let envelope: ResultSetEnvelope<PreArchiveRow> = self
            .get_json(&endpoints::prearchive_path(project), &[("format", "json".to_string())])
            .await?;

        Ok(envelope
            .result_set
            .result
            .into_iter()
            .map(PreArchiveRecord::from)
            .collect())
    }
}

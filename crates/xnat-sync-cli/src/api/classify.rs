//! Failure classification and the failure-response policy
//!
//! Every failed request collapses to `(method, path, code, phrase)`. Server
//! status failures keep their code; anything without a response becomes a
//! synthetic `500 Internal Server Error`.

use crate::error::{Result, SyncError};
use reqwest::{Method, StatusCode};
use scraper::{Html, Selector};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Longest body excerpt carried into diagnostics
const MAX_FRAGMENT_LEN: usize = 2048;

/// Classified view of a failed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedFailure {
    pub method: String,
    pub path: String,
    pub code: u16,
    pub phrase: String,
}

impl ClassifiedFailure {
    /// Classify a request failure; `None` for local errors.
    pub fn of(err: &SyncError) -> Option<Self> {
        match err {
            SyncError::Status {
                method,
                path,
                code,
                phrase,
                ..
            } => Some(Self {
                method: method.clone(),
                path: path.clone(),
                code: *code,
                phrase: phrase.clone(),
            }),
            SyncError::Transport { method, path, .. } => Some(Self {
                method: method.clone(),
                path: path.clone(),
                code: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                phrase: reason_phrase(StatusCode::INTERNAL_SERVER_ERROR),
            }),
            SyncError::Fatal(inner) => Self::of(inner),
            _ => None,
        }
    }
}

impl fmt::Display for ClassifiedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}) {} failed: <{} {:?}>",
            self.method, self.path, self.code, self.phrase
        )
    }
}

/// Build a status failure from a non-2xx response.
pub fn status_failure(method: &Method, path: &str, status: StatusCode, body: String) -> SyncError {
    SyncError::Status {
        method: method.to_string(),
        path: path.to_string(),
        code: status.as_u16(),
        phrase: reason_phrase(status),
        body: (!body.trim().is_empty()).then_some(body),
    }
}

/// Build a failure from a `reqwest` error raised while sending.
pub fn request_failure(method: &Method, path: &str, err: reqwest::Error) -> SyncError {
    match err.status() {
        Some(status) => status_failure(method, path, status, String::new()),
        None => SyncError::Transport {
            method: method.to_string(),
            path: path.to_string(),
            message: err.to_string(),
        },
    }
}

fn reason_phrase(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or("Unknown Status").to_string()
}

/// What a call site does with a classified failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    /// Swallow the failure; the caller receives no result
    Ignore,
    /// Hand the failure back to the immediate caller
    Raise,
    /// Escalate to the top-level handler, which reports and exits 1
    #[default]
    Quitter,
}

impl FailureMode {
    /// Apply this policy to the outcome of a request.
    ///
    /// Only request failures are subject to the policy; local errors always
    /// propagate unchanged.
    pub fn apply<T>(self, result: Result<T>) -> Result<Option<T>> {
        let err = match result {
            Ok(value) => return Ok(Some(value)),
            Err(err) if !err.is_request_failure() => return Err(err),
            Err(err) => err,
        };

        match self {
            FailureMode::Ignore => {
                if let Some(failure) = ClassifiedFailure::of(&err) {
                    debug!(
                        method = %failure.method,
                        path = %failure.path,
                        code = failure.code,
                        "Ignoring failed request"
                    );
                }
                Ok(None)
            }
            FailureMode::Raise => Err(err),
            FailureMode::Quitter => Err(match err {
                SyncError::Fatal(_) => err,
                other => SyncError::Fatal(Box::new(other)),
            }),
        }
    }
}

impl FromStr for FailureMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ignore" => Ok(FailureMode::Ignore),
            "raise" => Ok(FailureMode::Raise),
            "quitter" => Ok(FailureMode::Quitter),
            other => Err(SyncError::config(format!(
                "unrecognized failure mode '{}' (expected ignore, raise or quitter)",
                other
            ))),
        }
    }
}

/// Reduce a response body to something worth printing.
///
/// HTML error pages are boiled down to their headings (or title and
/// paragraphs when there are none); other bodies are trimmed and truncated.
pub fn error_fragment(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    let looks_like_html = trimmed.starts_with('<')
        && (trimmed.contains("<html") || trimmed.contains("<body") || trimmed.contains("<h"));
    let text = if looks_like_html {
        html_fragment(trimmed)?
    } else {
        trimmed.to_string()
    };

    Some(truncate(text, MAX_FRAGMENT_LEN))
}

fn html_fragment(body: &str) -> Option<String> {
    let document = Html::parse_document(body);

    for selector in ["h1, h2, h3", "title, p"] {
        let selector = Selector::parse(selector).ok()?;
        let parts: Vec<String> = document
            .select(&selector)
            .map(|node| node.text().collect::<Vec<_>>().join(" "))
            .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|text| !text.is_empty())
            .collect();

        if !parts.is_empty() {
            return Some(parts.join(" - "));
        }
    }

    None
}

fn truncate(mut text: String, max: usize) -> String {
    if text.len() > max {
        let mut cut = max;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("...");
    }
    text
}

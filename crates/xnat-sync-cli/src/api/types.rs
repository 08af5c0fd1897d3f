//! Archive response types
//!
//! Matches the JSON the archive returns for object reads (`items` envelope)
//! and for listings (`ResultSet` envelope).

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Field mapping of a single archive object
pub type ObjectFields = Map<String, Value>;

/// Status tag of a pre-archive entry still receiving files
pub const RECEIVING: &str = "RECEIVING";

/// `{"items": [...]}` envelope of object reads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemsEnvelope {
    #[serde(default)]
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    #[serde(default)]
    pub data_fields: ObjectFields,
}

/// `{"ResultSet": {"Result": [...]}}` envelope of listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSetEnvelope<T> {
    #[serde(rename = "ResultSet")]
    pub result_set: ResultSet<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSet<T> {
    #[serde(rename = "Result", default = "Vec::new")]
    pub result: Vec<T>,
}

/// Container object kinds handled by the acquirer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Subject,
    Session,
    Scan,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Subject => write!(f, "subject"),
            ObjectKind::Session => write!(f, "session"),
            ObjectKind::Scan => write!(f, "scan"),
        }
    }
}

/// Remote Subject, Session or Scan as last read from the archive
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteObjectRef {
    pub kind: ObjectKind,
    /// Server-assigned identity
    pub id: String,
    pub label: Option<String>,
    pub project: Option<String>,
    /// Everything else the archive reported
    pub fields: ObjectFields,
}

impl RemoteObjectRef {
    pub fn from_fields(kind: ObjectKind, fields: ObjectFields) -> Self {
        let text = |key: &str| fields.get(key).and_then(value_text);
        Self {
            kind,
            id: text("ID").or_else(|| text("id")).unwrap_or_default(),
            label: text("label"),
            project: text("project"),
            fields,
        }
    }

    /// Descriptive field as text, e.g. `modality` or `scanner`.
    pub fn field(&self, key: &str) -> Option<String> {
        self.fields.get(key).and_then(value_text)
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Raw pre-archive row as listed by the archive
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreArchiveRow {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "folderName")]
    pub folder_name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub uploaded: Option<String>,
    #[serde(default)]
    pub scan_date: Option<String>,
    #[serde(default)]
    pub scan_time: Option<String>,
    #[serde(default)]
    pub lastmod: Option<String>,
}

/// In-flight import entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreArchiveRecord {
    pub status: String,
    pub subject: String,
    pub session: String,
    /// [`far_future`] when absent or unparseable
    pub uploaded: DateTime<Utc>,
    pub scan_time: DateTime<Utc>,
    pub scan_date: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl PreArchiveRecord {
    pub fn is_receiving(&self) -> bool {
        self.status.eq_ignore_ascii_case(RECEIVING)
    }
}

impl From<PreArchiveRow> for PreArchiveRecord {
    fn from(row: PreArchiveRow) -> Self {
        let scan_date = row.scan_date.as_deref().and_then(parse_date);
        let scan_time = match (scan_date, row.scan_time.as_deref().and_then(parse_time)) {
            (Some(date), Some(time)) => Some(Utc.from_utc_datetime(&date.and_time(time))),
            _ => None,
        };

        Self {
            status: row.status.unwrap_or_default(),
            subject: row.subject.unwrap_or_default(),
            session: row.name.or(row.folder_name).unwrap_or_default(),
            uploaded: row.uploaded.as_deref().and_then(parse_instant).unwrap_or_else(far_future),
            scan_time: scan_time.unwrap_or_else(far_future),
            scan_date: scan_date
                .map(|d| Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN)))
                .unwrap_or_else(far_future),
            last_modified: row.lastmod.as_deref().and_then(parse_instant).unwrap_or_else(far_future),
        }
    }
}

/// Sentinel for absent timestamps
pub fn far_future() -> DateTime<Utc> {
    DateTime::<Utc>::MAX_UTC
}

fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Some(instant.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y%m%d_%H%M%S%3f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    ["%Y-%m-%d", "%Y%m%d", "%m/%d/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

fn parse_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    ["%H:%M:%S%.f", "%H%M%S"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(raw, fmt).ok())
}

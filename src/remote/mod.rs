//! Remote record surface consumed by the engine.
//!
//! The engine only sees [`RecordClient`]: a list read and a single write per entity
//! kind. Transport, credentials and the backend's own validation live behind it.

mod http;

pub use http::{Credentials, HttpRecordClient};

use crate::model::{AttendanceRecord, CalendarEvent, EntityKind, Homework, Mark, Notice, Student};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RemoteError {
    #[error("unauthorized, sign in again")]
    Unauthorized,
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    ValidationFailed(String),
    #[error("record source unavailable: {0}")]
    Unavailable(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub student_id: Option<String>,
}

impl RecordFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn student(student_id: &str) -> Self {
        Self {
            student_id: Some(student_id.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Create(serde_json::Value),
    Update {
        id: String,
        payload: serde_json::Value,
    },
    Delete {
        id: String,
    },
}

impl WriteOp {
    pub fn verb(&self) -> &'static str {
        match self {
            WriteOp::Create(_) => "create",
            WriteOp::Update { .. } => "update",
            WriteOp::Delete { .. } => "delete",
        }
    }
}

#[async_trait]
pub trait RecordClient: Send + Sync {
    async fn fetch(
        &self,
        kind: EntityKind,
        filter: &RecordFilter,
    ) -> RemoteResult<Vec<serde_json::Value>>;

    async fn write(&self, kind: EntityKind, op: WriteOp) -> RemoteResult<serde_json::Value>;

    /// Short human label for health output and logs.
    fn describe(&self) -> String;
}

fn decode<T: DeserializeOwned>(
    kind: EntityKind,
    rows: Vec<serde_json::Value>,
) -> RemoteResult<Vec<T>> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(row).map_err(|e| {
                RemoteError::Unavailable(format!("malformed {} record: {}", kind, e))
            })
        })
        .collect()
}

async fn list<T: DeserializeOwned>(
    client: &dyn RecordClient,
    kind: EntityKind,
    filter: &RecordFilter,
) -> RemoteResult<Vec<T>> {
    let rows = client.fetch(kind, filter).await?;
    decode(kind, rows)
}

pub async fn list_students(client: &dyn RecordClient) -> RemoteResult<Vec<Student>> {
    list(client, EntityKind::Student, &RecordFilter::all()).await
}

pub async fn list_attendance(
    client: &dyn RecordClient,
    student_id: Option<&str>,
) -> RemoteResult<Vec<AttendanceRecord>> {
    let filter = student_id.map(RecordFilter::student).unwrap_or_default();
    list(client, EntityKind::Attendance, &filter).await
}

pub async fn list_marks(
    client: &dyn RecordClient,
    student_id: Option<&str>,
) -> RemoteResult<Vec<Mark>> {
    let filter = student_id.map(RecordFilter::student).unwrap_or_default();
    list(client, EntityKind::Mark, &filter).await
}

pub async fn list_homework(client: &dyn RecordClient) -> RemoteResult<Vec<Homework>> {
    list(client, EntityKind::Homework, &RecordFilter::all()).await
}

pub async fn list_notices(client: &dyn RecordClient) -> RemoteResult<Vec<Notice>> {
    list(client, EntityKind::Notice, &RecordFilter::all()).await
}

pub async fn list_calendar_events(client: &dyn RecordClient) -> RemoteResult<Vec<CalendarEvent>> {
    list(client, EntityKind::CalendarEvent, &RecordFilter::all()).await
}

/// Flattens a list response. Mark history may come back categorised as an object
/// of arrays; every array value is concatenated in key order.
pub fn flatten_rows(body: serde_json::Value) -> Vec<serde_json::Value> {
    match body {
        serde_json::Value::Array(rows) => rows,
        serde_json::Value::Object(map) => map
            .into_iter()
            .filter_map(|(_, v)| match v {
                serde_json::Value::Array(rows) => Some(rows),
                _ => None,
            })
            .flatten()
            .collect(),
        _ => Vec::new(),
    }
}

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::overlay::{DirtyEntry, DirtyValue};
use crate::engine::reconcile::HistoryScope;
use crate::model::EntityKind;
use crate::remote::{RecordClient, RemoteResult, WriteOp};
use chrono::{DateTime, NaiveDate, Utc};
use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedWrite {
    pub entry: DirtyEntry,
    pub kind: EntityKind,
    pub op: WriteOp,
}

#[derive(Debug)]
pub struct WriteOutcome {
    pub entry: DirtyEntry,
    pub verb: &'static str,
    pub result: RemoteResult<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitFailure {
    pub student_id: String,
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitReport {
    pub attempted: usize,
    pub created: usize,
    pub updated: usize,
    pub failed: Vec<CommitFailure>,
    /// Edits still pending after the batch.
    pub retained: usize,
    pub refreshed: bool,
}

/// Attendance may only be written for the current day.
pub fn check_window(scope: &HistoryScope, today: NaiveDate) -> EngineResult<()> {
    match scope {
        HistoryScope::Attendance { date } if *date != today => {
            Err(EngineError::InvalidCommitWindow { date: *date, today })
        }
        _ => Ok(()),
    }
}

/// Turns overlay entries into writes: an entry with a baseline updates it, one
/// without creates a record carrying the full scope tuple.
pub fn plan_writes(
    scope: &HistoryScope,
    entries: Vec<DirtyEntry>,
    now: DateTime<Utc>,
) -> EngineResult<Vec<PlannedWrite>> {
    entries
        .into_iter()
        .map(|entry| {
            let (kind, create, patch) = match (scope, &entry.value) {
                (HistoryScope::Attendance { date }, DirtyValue::Presence { status }) => (
                    EntityKind::Attendance,
                    json!({
                        "studentID": entry.student_id,
                        "status": status.as_str(),
                        "date": date.format("%Y-%m-%d").to_string(),
                    }),
                    json!({ "status": status.as_str() }),
                ),
                (
                    HistoryScope::Marks(ms),
                    DirtyValue::Mark {
                        marks_obtained,
                        total_marks,
                    },
                ) => (
                    EntityKind::Mark,
                    json!({
                        "studentID": entry.student_id,
                        "subject": ms.subject,
                        "examType": ms.exam_type.as_str(),
                        "semester": ms.semester,
                        "marksObtained": marks_obtained,
                        "totalMarks": total_marks,
                        "date": now.to_rfc3339(),
                    }),
                    json!({ "marksObtained": marks_obtained }),
                ),
                _ => {
                    return Err(EngineError::ValidationFailed(format!(
                        "pending edit for {} does not belong to the {} view",
                        entry.student_id,
                        scope.label()
                    )))
                }
            };
            let op = match &entry.baseline {
                Some(id) => WriteOp::Update {
                    id: id.clone(),
                    payload: patch,
                },
                None => WriteOp::Create(create),
            };
            Ok(PlannedWrite { entry, kind, op })
        })
        .collect()
}

/// Issues every write concurrently and waits for all of them.
pub async fn issue(client: &dyn RecordClient, writes: Vec<PlannedWrite>) -> Vec<WriteOutcome> {
    join_all(writes.into_iter().map(|w| async move {
        let verb = w.op.verb();
        let result = client.write(w.kind, w.op).await;
        WriteOutcome {
            entry: w.entry,
            verb,
            result,
        }
    }))
    .await
}

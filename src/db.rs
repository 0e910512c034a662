use crate::model::{parse_date, AttendanceStatus, EntityKind};
use crate::remote::{RecordClient, RecordFilter, RemoteError, RemoteResult, WriteOp};
use async_trait::async_trait;
use chrono::{Local, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task;
use uuid::Uuid;

const DB_FILE: &str = "rosterd.sqlite3";
/// How long a writer waits for another connection's transaction to finish.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS records(
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            student_id TEXT,
            record_date TEXT,
            body TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_kind_student ON records(kind, student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_kind_date ON records(kind, record_date)",
        [],
    )?;

    Ok(conn)
}

/// Record store kept in a local workspace directory. Serves the same surface as the
/// HTTP backend so a workspace can be used offline.
#[derive(Clone)]
pub struct LocalStore {
    db_path: PathBuf,
}

impl LocalStore {
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        open_db(workspace)?;
        Ok(Self {
            db_path: workspace.join(DB_FILE),
        })
    }

    async fn blocking<T, F>(&self, f: F) -> RemoteResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> RemoteResult<T> + Send + 'static,
    {
        let path = self.db_path.clone();
        task::spawn_blocking(move || {
            let conn = Connection::open(&path).map_err(store_err)?;
            conn.busy_timeout(BUSY_TIMEOUT).map_err(store_err)?;
            f(&conn)
        })
        .await
        .map_err(store_err)?
    }
}

fn store_err(e: impl std::fmt::Display) -> RemoteError {
    RemoteError::Unavailable(format!("local store: {e}"))
}

fn load_body(conn: &Connection, kind: EntityKind, id: &str) -> RemoteResult<Option<Map<String, Value>>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT body FROM records WHERE kind = ? AND id = ?",
            (kind.as_str(), id),
            |r| r.get(0),
        )
        .optional()
        .map_err(store_err)?;
    match raw {
        None => Ok(None),
        Some(raw) => match serde_json::from_str::<Value>(&raw).map_err(store_err)? {
            Value::Object(map) => Ok(Some(map)),
            _ => Err(store_err(format!("record {id} is not an object"))),
        },
    }
}

fn str_field(body: &Map<String, Value>, key: &str) -> Option<String> {
    body.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn required(body: &Map<String, Value>, key: &str) -> RemoteResult<String> {
    str_field(body, key).ok_or_else(|| RemoteError::ValidationFailed(format!("{key} is required")))
}

fn attendance_status(body: &Map<String, Value>) -> RemoteResult<AttendanceStatus> {
    str_field(body, "status")
        .as_deref()
        .and_then(AttendanceStatus::parse)
        .ok_or_else(|| {
            RemoteError::ValidationFailed("status must be Present or Absent".to_string())
        })
}

fn prepare_attendance(conn: &Connection, body: &mut Map<String, Value>) -> RemoteResult<()> {
    let student_id = required(body, "studentID")?;
    let status = attendance_status(body)?;
    let date = match str_field(body, "date") {
        Some(raw) => parse_date(&raw).ok_or_else(|| {
            RemoteError::ValidationFailed(format!("date must be YYYY-MM-DD, got {raw}"))
        })?,
        None => Local::now().date_naive(),
    };
    let date_key = date.format("%Y-%m-%d").to_string();

    let exists = conn
        .query_row(
            "SELECT 1 FROM records WHERE kind = 'attendance' AND student_id = ? AND record_date = ?",
            (&student_id, &date_key),
            |r| r.get::<_, i64>(0),
        )
        .optional()
        .map_err(store_err)?
        .is_some();
    if exists {
        return Err(RemoteError::ValidationFailed(format!(
            "attendance already marked for {student_id} on {date_key}"
        )));
    }

    let previous: Option<String> = conn
        .query_row(
            "SELECT body FROM records
             WHERE kind = 'attendance' AND student_id = ? AND record_date < ?
             ORDER BY record_date DESC, rowid DESC
             LIMIT 1",
            (&student_id, &date_key),
            |r| r.get(0),
        )
        .optional()
        .map_err(store_err)?;
    let (days, present) = previous
        .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
        .map(|prev| {
            (
                prev.get("totalDays").and_then(|v| v.as_i64()).unwrap_or(0),
                prev.get("totalPresent").and_then(|v| v.as_i64()).unwrap_or(0),
            )
        })
        .unwrap_or((0, 0));
    let present_today = i64::from(status == AttendanceStatus::Present);

    body.insert("date".into(), json!(date_key));
    body.insert("status".into(), json!(status.as_str()));
    body.insert("totalDays".into(), json!(days + 1));
    body.insert("totalPresent".into(), json!(present + present_today));
    Ok(())
}

fn prepare_create(
    conn: &Connection,
    kind: EntityKind,
    body: &mut Map<String, Value>,
) -> RemoteResult<()> {
    match kind {
        EntityKind::Attendance => prepare_attendance(conn, body)?,
        EntityKind::Student => {
            let student_id = required(body, "studentID")?;
            let taken = conn
                .query_row(
                    "SELECT 1 FROM records WHERE kind = 'student' AND student_id = ?",
                    [&student_id],
                    |r| r.get::<_, i64>(0),
                )
                .optional()
                .map_err(store_err)?
                .is_some();
            if taken {
                return Err(RemoteError::ValidationFailed(format!(
                    "studentID {student_id} already exists"
                )));
            }
        }
        EntityKind::Mark | EntityKind::Homework | EntityKind::Notice => {
            if str_field(body, "date").is_none() {
                body.insert("date".into(), json!(Utc::now().to_rfc3339()));
            }
        }
        EntityKind::CalendarEvent => {
            if str_field(body, "createdAt").is_none() {
                body.insert("createdAt".into(), json!(Utc::now().to_rfc3339()));
            }
        }
    }
    Ok(())
}

fn record_date(kind: EntityKind, body: &Map<String, Value>) -> Option<String> {
    let raw = match kind {
        EntityKind::Homework => str_field(body, "dueDate"),
        _ => str_field(body, "date"),
    }?;
    parse_date(&raw).map(|d| d.format("%Y-%m-%d").to_string())
}

fn create_record(conn: &Connection, kind: EntityKind, payload: Value) -> RemoteResult<Value> {
    let Value::Object(mut body) = payload else {
        return Err(RemoteError::ValidationFailed(
            "payload must be an object".to_string(),
        ));
    };
    prepare_create(conn, kind, &mut body)?;
    let id = Uuid::new_v4().simple().to_string();
    body.insert("_id".into(), json!(id));
    let student_id = str_field(&body, "studentID");
    let date = record_date(kind, &body);
    let body = Value::Object(body);
    conn.execute(
        "INSERT INTO records(id, kind, student_id, record_date, body, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &id,
            kind.as_str(),
            &student_id,
            &date,
            body.to_string(),
            Utc::now().to_rfc3339(),
        ),
    )
    .map_err(store_err)?;
    Ok(body)
}

fn update_record(
    conn: &Connection,
    kind: EntityKind,
    id: &str,
    payload: Value,
) -> RemoteResult<Value> {
    let Value::Object(patch) = payload else {
        return Err(RemoteError::ValidationFailed(
            "payload must be an object".to_string(),
        ));
    };
    let Some(mut body) = load_body(conn, kind, id)? else {
        return Err(RemoteError::NotFound(format!("{kind} {id}")));
    };

    if kind == EntityKind::Attendance && patch.contains_key("status") {
        let before = attendance_status(&body)?;
        let after = attendance_status(&patch)?;
        let present = body
            .get("totalPresent")
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        let adjusted = match (before, after) {
            (AttendanceStatus::Absent, AttendanceStatus::Present) => present + 1,
            (AttendanceStatus::Present, AttendanceStatus::Absent) => (present - 1).max(0),
            _ => present,
        };
        body.insert("totalPresent".into(), json!(adjusted));
        body.insert("status".into(), json!(after.as_str()));
    }
    for (key, value) in patch {
        if key == "_id" || (kind == EntityKind::Attendance && key == "status") {
            continue;
        }
        body.insert(key, value);
    }

    let student_id = str_field(&body, "studentID");
    let date = record_date(kind, &body);
    let body = Value::Object(body);
    conn.execute(
        "UPDATE records SET body = ?, student_id = ?, record_date = ?, updated_at = ?
         WHERE kind = ? AND id = ?",
        (
            body.to_string(),
            &student_id,
            &date,
            Utc::now().to_rfc3339(),
            kind.as_str(),
            id,
        ),
    )
    .map_err(store_err)?;
    Ok(body)
}

fn delete_record(conn: &Connection, kind: EntityKind, id: &str) -> RemoteResult<Value> {
    let changed = conn
        .execute(
            "DELETE FROM records WHERE kind = ? AND id = ?",
            (kind.as_str(), id),
        )
        .map_err(store_err)?;
    if changed == 0 {
        return Err(RemoteError::NotFound(format!("{kind} {id}")));
    }
    Ok(json!({ "_id": id, "deleted": true }))
}

#[async_trait]
impl RecordClient for LocalStore {
    async fn fetch(&self, kind: EntityKind, filter: &RecordFilter) -> RemoteResult<Vec<Value>> {
        let student_id = filter.student_id.clone();
        self.blocking(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT body FROM records
                     WHERE kind = ?1 AND (?2 IS NULL OR student_id = ?2)
                     ORDER BY rowid",
                )
                .map_err(store_err)?;
            let rows = stmt
                .query_map((kind.as_str(), &student_id), |r| r.get::<_, String>(0))
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
                .map_err(store_err)?;
            rows.iter()
                .map(|raw| serde_json::from_str::<Value>(raw).map_err(store_err))
                .collect()
        })
        .await
    }

    async fn write(&self, kind: EntityKind, op: WriteOp) -> RemoteResult<Value> {
        // Checks and the write share one immediate transaction, so two writers
        // cannot both pass the duplicate check for the same student and day.
        self.blocking(move |conn| {
            let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
                .map_err(store_err)?;
            let written = match op {
                WriteOp::Create(payload) => create_record(&tx, kind, payload),
                WriteOp::Update { id, payload } => update_record(&tx, kind, &id, payload),
                WriteOp::Delete { id } => delete_record(&tx, kind, &id),
            }?;
            tx.commit().map_err(store_err)?;
            Ok(written)
        })
        .await
    }

    fn describe(&self) -> String {
        format!("workspace:{}", self.db_path.to_string_lossy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, LocalStore) {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = LocalStore::open(dir.path()).expect("open store");
        (dir, store)
    }

    #[tokio::test]
    async fn attendance_create_accumulates_totals() {
        let (_dir, store) = store();
        for (date, status) in [
            ("2024-03-01", "Present"),
            ("2024-03-02", "Absent"),
            ("2024-03-03", "Present"),
        ] {
            store
                .write(
                    EntityKind::Attendance,
                    WriteOp::Create(json!({ "studentID": "S1", "status": status, "date": date })),
                )
                .await
                .expect("create attendance");
        }
        let rows = store
            .fetch(EntityKind::Attendance, &RecordFilter::student("S1"))
            .await
            .expect("fetch");
        let last = rows.last().expect("last row");
        assert_eq!(last["totalDays"], json!(3));
        assert_eq!(last["totalPresent"], json!(2));
    }

    #[tokio::test]
    async fn second_attendance_for_same_day_is_rejected() {
        let (_dir, store) = store();
        let create = || {
            WriteOp::Create(json!({ "studentID": "S1", "status": "Present", "date": "2024-03-01" }))
        };
        store
            .write(EntityKind::Attendance, create())
            .await
            .expect("first create");
        let err = store
            .write(EntityKind::Attendance, create())
            .await
            .expect_err("duplicate");
        assert!(matches!(err, RemoteError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn update_flips_status_and_present_total() {
        let (_dir, store) = store();
        let created = store
            .write(
                EntityKind::Attendance,
                WriteOp::Create(json!({ "studentID": "S1", "status": "Present", "date": "2024-03-01" })),
            )
            .await
            .expect("create");
        let id = created["_id"].as_str().expect("id").to_string();
        let updated = store
            .write(
                EntityKind::Attendance,
                WriteOp::Update {
                    id: id.clone(),
                    payload: json!({ "status": "Absent" }),
                },
            )
            .await
            .expect("update");
        assert_eq!(updated["status"], json!("Absent"));
        assert_eq!(updated["totalPresent"], json!(0));
        assert_eq!(updated["totalDays"], json!(1));
        assert_eq!(updated["_id"], json!(id));
    }

    #[tokio::test]
    async fn missing_records_report_not_found() {
        let (_dir, store) = store();
        let err = store
            .write(
                EntityKind::Mark,
                WriteOp::Update {
                    id: "nope".into(),
                    payload: json!({ "marksObtained": 3 }),
                },
            )
            .await
            .expect_err("missing");
        assert!(matches!(err, RemoteError::NotFound(_)));
        let err = store
            .write(EntityKind::Notice, WriteOp::Delete { id: "nope".into() })
            .await
            .expect_err("missing");
        assert!(matches!(err, RemoteError::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_creates_for_one_day_write_once() {
        let (_dir, store) = store();
        let create = || {
            WriteOp::Create(json!({ "studentID": "S1", "status": "Present", "date": "2024-03-01" }))
        };
        let (a, b) = tokio::join!(
            store.write(EntityKind::Attendance, create()),
            store.write(EntityKind::Attendance, create()),
        );
        assert_eq!(usize::from(a.is_ok()) + usize::from(b.is_ok()), 1);
        let loser = a.and(b).expect_err("one create refused");
        assert!(matches!(loser, RemoteError::ValidationFailed(_)));
        let rows = store
            .fetch(EntityKind::Attendance, &RecordFilter::student("S1"))
            .await
            .expect("fetch");
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn reopened_workspace_tracks_updates() {
        let (dir, store) = store();
        let created = store
            .write(
                EntityKind::Notice,
                WriteOp::Create(json!({ "title": "Trip", "description": "Bring lunch" })),
            )
            .await
            .expect("create");
        let id = created["_id"].as_str().expect("id").to_string();

        let reopened = LocalStore::open(dir.path()).expect("reopen");
        reopened
            .write(
                EntityKind::Notice,
                WriteOp::Update {
                    id: id.clone(),
                    payload: json!({ "title": "Museum trip" }),
                },
            )
            .await
            .expect("update");

        let conn = open_db(dir.path()).expect("open db");
        let (title, updated_at): (String, Option<String>) = conn
            .query_row(
                "SELECT json_extract(body, '$.title'), updated_at FROM records WHERE id = ?",
                [&id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .expect("row");
        assert_eq!(title, "Museum trip");
        assert!(updated_at.is_some());
    }
}

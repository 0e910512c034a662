//! In-memory record client for engine tests.

use crate::model::EntityKind;
use crate::remote::{RecordClient, RecordFilter, RemoteError, RemoteResult, WriteOp};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

pub fn student(id: &str, first: &str, grade: i64, section: &str) -> Value {
    json!({
        "_id": format!("doc-{id}"),
        "studentID": id,
        "firstName": first,
        "grade": grade,
        "section": section,
        "email": format!("{}@school.test", id.to_lowercase())
    })
}

pub fn attendance(id: &str, student_id: &str, date: &str, status: &str, days: i64, present: i64) -> Value {
    json!({
        "_id": id,
        "studentID": student_id,
        "date": date,
        "status": status,
        "totalDays": days,
        "totalPresent": present
    })
}

#[allow(clippy::too_many_arguments)]
pub fn mark(
    id: &str,
    student_id: &str,
    subject: &str,
    exam_type: &str,
    semester: &str,
    obtained: f64,
    total: f64,
    date: &str,
) -> Value {
    json!({
        "_id": id,
        "studentID": student_id,
        "subject": subject,
        "examType": exam_type,
        "semester": semester,
        "marksObtained": obtained,
        "totalMarks": total,
        "date": date
    })
}

#[derive(Default)]
pub struct ScriptedClient {
    records: Mutex<HashMap<EntityKind, Vec<Value>>>,
    roster_down: AtomicBool,
    failing_fetch: Mutex<HashSet<String>>,
    failing_writes: Mutex<HashSet<String>>,
    writes: Mutex<Vec<(EntityKind, WriteOp)>>,
    gate: Option<Arc<Semaphore>>,
    parked: AtomicUsize,
    write_gate: Option<Arc<Semaphore>>,
    parked_writes: AtomicUsize,
    next_id: AtomicUsize,
}

impl ScriptedClient {
    pub fn new(students: Vec<Value>) -> Self {
        let client = Self::default();
        client.seed(EntityKind::Student, students);
        client
    }

    /// History fetches wait for [`ScriptedClient::release`].
    pub fn gated(students: Vec<Value>) -> Self {
        let mut client = Self::new(students);
        client.gate = Some(Arc::new(Semaphore::new(0)));
        client
    }

    /// Writes wait for [`ScriptedClient::release_writes`]; fetches run freely.
    pub fn write_gated(students: Vec<Value>) -> Self {
        let mut client = Self::new(students);
        client.write_gate = Some(Arc::new(Semaphore::new(0)));
        client
    }

    pub fn seed(&self, kind: EntityKind, rows: Vec<Value>) {
        self.records
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .extend(rows);
    }

    pub fn fail_roster(&self) {
        self.roster_down.store(true, Ordering::SeqCst);
    }

    pub fn fail_fetch_for(&self, student_id: &str) {
        self.failing_fetch
            .lock()
            .unwrap()
            .insert(student_id.to_string());
    }

    pub fn fail_writes_for(&self, student_ids: &[&str]) {
        let mut failing = self.failing_writes.lock().unwrap();
        failing.clear();
        failing.extend(student_ids.iter().map(|s| s.to_string()));
    }

    pub fn writes(&self) -> Vec<(EntityKind, WriteOp)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn rows(&self, kind: EntityKind) -> Vec<Value> {
        self.records
            .lock()
            .unwrap()
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    pub fn parked(&self) -> usize {
        self.parked.load(Ordering::SeqCst)
    }

    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn parked_writes(&self) -> usize {
        self.parked_writes.load(Ordering::SeqCst)
    }

    pub fn release_writes(&self, permits: usize) {
        if let Some(gate) = &self.write_gate {
            gate.add_permits(permits);
        }
    }

    fn owner_of(&self, kind: EntityKind, op: &WriteOp) -> Option<String> {
        let from_payload = |p: &Value| p.get("studentID").and_then(|v| v.as_str()).map(String::from);
        match op {
            WriteOp::Create(payload) => from_payload(payload),
            WriteOp::Update { id, .. } | WriteOp::Delete { id } => self
                .rows(kind)
                .iter()
                .find(|r| r.get("_id").and_then(|v| v.as_str()) == Some(id.as_str()))
                .and_then(from_payload),
        }
    }
}

#[async_trait]
impl RecordClient for ScriptedClient {
    async fn fetch(&self, kind: EntityKind, filter: &RecordFilter) -> RemoteResult<Vec<Value>> {
        if kind == EntityKind::Student {
            if self.roster_down.load(Ordering::SeqCst) {
                return Err(RemoteError::Unavailable("connection refused".into()));
            }
            return Ok(self.rows(kind));
        }
        if let Some(gate) = &self.gate {
            self.parked.fetch_add(1, Ordering::SeqCst);
            gate.acquire().await.expect("gate open").forget();
        }
        if let Some(sid) = filter.student_id.as_deref() {
            if self.failing_fetch.lock().unwrap().contains(sid) {
                return Err(RemoteError::Unavailable(format!("history for {sid} timed out")));
            }
        }
        Ok(self
            .rows(kind)
            .into_iter()
            .filter(|r| match filter.student_id.as_deref() {
                Some(sid) => r.get("studentID").and_then(|v| v.as_str()) == Some(sid),
                None => true,
            })
            .collect())
    }

    async fn write(&self, kind: EntityKind, op: WriteOp) -> RemoteResult<Value> {
        if let Some(gate) = &self.write_gate {
            self.parked_writes.fetch_add(1, Ordering::SeqCst);
            gate.acquire().await.expect("gate open").forget();
        }
        self.writes.lock().unwrap().push((kind, op.clone()));
        if let Some(owner) = self.owner_of(kind, &op) {
            if self.failing_writes.lock().unwrap().contains(&owner) {
                return Err(RemoteError::ValidationFailed(format!("rejected write for {owner}")));
            }
        }
        let mut records = self.records.lock().unwrap();
        let rows = records.entry(kind).or_default();
        match op {
            WriteOp::Create(mut payload) => {
                let n = self.next_id.fetch_add(1, Ordering::SeqCst);
                payload["_id"] = json!(format!("new-{n}"));
                rows.push(payload.clone());
                Ok(payload)
            }
            WriteOp::Update { id, payload } => {
                let Some(row) = rows
                    .iter_mut()
                    .find(|r| r.get("_id").and_then(|v| v.as_str()) == Some(id.as_str()))
                else {
                    return Err(RemoteError::NotFound(id));
                };
                if let (Some(target), Some(patch)) = (row.as_object_mut(), payload.as_object()) {
                    for (k, v) in patch {
                        target.insert(k.clone(), v.clone());
                    }
                }
                Ok(row.clone())
            }
            WriteOp::Delete { id } => {
                rows.retain(|r| r.get("_id").and_then(|v| v.as_str()) != Some(id.as_str()));
                Ok(json!({ "_id": id, "deleted": true }))
            }
        }
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

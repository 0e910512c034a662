use crate::calc::{self, AttendanceSummary, GradedMark, OverallGrade};
use crate::config::Limits;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::overlay::DirtyValue;
use crate::model::{AttendanceRecord, AttendanceStatus, ExamType, Mark, Student};
use crate::remote::{self, RecordClient, RemoteError};
use chrono::NaiveDate;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkScope {
    pub subject: String,
    pub exam_type: ExamType,
    pub semester: String,
}

impl MarkScope {
    pub fn matches(&self, mark: &Mark) -> bool {
        mark.exam_type == self.exam_type
            && mark.subject.trim().eq_ignore_ascii_case(self.subject.trim())
            && mark.semester.trim().eq_ignore_ascii_case(self.semester.trim())
    }
}

/// What the per-student history is resolved against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum HistoryScope {
    Attendance { date: NaiveDate },
    Marks(MarkScope),
}

impl HistoryScope {
    pub fn label(&self) -> &'static str {
        match self {
            HistoryScope::Attendance { .. } => "attendance",
            HistoryScope::Marks(_) => "marks",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Presence {
    Present,
    Absent,
    Unmarked,
}

impl Presence {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "present" => Some(Presence::Present),
            "absent" => Some(Presence::Absent),
            "unmarked" | "" => Some(Presence::Unmarked),
            _ => None,
        }
    }

    pub fn status(self) -> Option<AttendanceStatus> {
        match self {
            Presence::Present => Some(AttendanceStatus::Present),
            Presence::Absent => Some(AttendanceStatus::Absent),
            Presence::Unmarked => None,
        }
    }
}

impl From<AttendanceStatus> for Presence {
    fn from(status: AttendanceStatus) -> Self {
        match status {
            AttendanceStatus::Present => Presence::Present,
            AttendanceStatus::Absent => Presence::Absent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum HistoryStatus {
    Loaded,
    Unavailable { message: String },
}

/// One roster row with its resolved baseline and any pending edit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentView {
    pub student: Student,
    pub history: HistoryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence: Option<Presence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendance: Option<AttendanceRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_mark: Option<Mark>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<DirtyValue>,
}

impl StudentView {
    fn unavailable(student: Student, error: &RemoteError) -> Self {
        Self {
            student,
            history: HistoryStatus::Unavailable {
                message: error.to_string(),
            },
            presence: None,
            attendance: None,
            current_mark: None,
            pending: None,
        }
    }

    pub fn student_id(&self) -> &str {
        &self.student.student_id
    }

    pub fn is_loaded(&self) -> bool {
        self.history == HistoryStatus::Loaded
    }

    /// Id of the record an edit to this row would update.
    pub fn baseline_id(&self) -> Option<String> {
        self.attendance
            .as_ref()
            .map(|a| a.id.clone())
            .or_else(|| self.current_mark.as_ref().map(|m| m.id.clone()))
    }

    /// Presence shown to the teacher: the pending edit if any, else the baseline.
    pub fn effective_presence(&self) -> Option<Presence> {
        match &self.pending {
            Some(DirtyValue::Presence { status }) => Some((*status).into()),
            _ => self.presence,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciled {
    pub views: Vec<StudentView>,
    pub warnings: Vec<String>,
    pub unauthorized: bool,
}

/// Picks the record for `date`. Several on the same day is a conflict; the last one
/// listed is kept.
pub fn select_attendance(
    records: Vec<AttendanceRecord>,
    date: NaiveDate,
) -> (Option<AttendanceRecord>, usize) {
    let mut hits: Vec<AttendanceRecord> = records
        .into_iter()
        .filter(|r| r.day() == Some(date))
        .collect();
    let count = hits.len();
    (hits.pop(), count)
}

/// Picks the mark for `scope`. Several is a conflict; the most recently dated wins,
/// later list position breaking ties.
pub fn select_mark(marks: Vec<Mark>, scope: &MarkScope) -> (Option<Mark>, usize) {
    let hits: Vec<Mark> = marks.into_iter().filter(|m| scope.matches(m)).collect();
    let count = hits.len();
    let chosen = hits
        .into_iter()
        .enumerate()
        .max_by(|(ia, a), (ib, b)| a.timestamp().cmp(&b.timestamp()).then(ia.cmp(ib)))
        .map(|(_, m)| m);
    (chosen, count)
}

async fn resolve_student(
    client: &dyn RecordClient,
    student: &Student,
    scope: &HistoryScope,
) -> (StudentView, Option<String>, Option<RemoteError>) {
    let sid = student.student_id.as_str();
    match scope {
        HistoryScope::Attendance { date } => {
            match remote::list_attendance(client, Some(sid)).await {
                Ok(mut records) => {
                    records.retain(|r| r.student_id == sid);
                    let (record, hits) = select_attendance(records, *date);
                    let warning = (hits > 1).then(|| {
                        format!("conflict: {hits} attendance records for {sid} on {date}")
                    });
                    let presence = record
                        .as_ref()
                        .map(|r| Presence::from(r.status))
                        .unwrap_or(Presence::Unmarked);
                    let view = StudentView {
                        student: student.clone(),
                        history: HistoryStatus::Loaded,
                        presence: Some(presence),
                        attendance: record,
                        current_mark: None,
                        pending: None,
                    };
                    (view, warning, None)
                }
                Err(e) => (StudentView::unavailable(student.clone(), &e), None, Some(e)),
            }
        }
        HistoryScope::Marks(ms) => match remote::list_marks(client, Some(sid)).await {
            Ok(mut marks) => {
                marks.retain(|m| m.student_id == sid);
                let (mark, hits) = select_mark(marks, ms);
                let warning = (hits > 1).then(|| {
                    format!(
                        "conflict: {hits} {} marks for {sid} in {} {}",
                        ms.exam_type.as_str(),
                        ms.subject,
                        ms.semester
                    )
                });
                let view = StudentView {
                    student: student.clone(),
                    history: HistoryStatus::Loaded,
                    presence: None,
                    attendance: None,
                    current_mark: mark,
                    pending: None,
                };
                (view, warning, None)
            }
            Err(e) => (StudentView::unavailable(student.clone(), &e), None, Some(e)),
        },
    }
}

/// Fans out one history read per roster member and waits for all of them. A failed
/// read only affects that student's row.
pub async fn reconcile(
    client: &dyn RecordClient,
    roster: &[Student],
    scope: &HistoryScope,
) -> Reconciled {
    let outcomes = join_all(roster.iter().map(|s| resolve_student(client, s, scope))).await;
    let mut out = Reconciled::default();
    for (view, warning, error) in outcomes {
        if let Some(w) = warning {
            warn!(scope = scope.label(), "{w}");
            out.warnings.push(w);
        }
        if let Some(e) = error {
            warn!(student = view.student_id(), error = %e, "history fetch failed");
            out.unauthorized |= e == RemoteError::Unauthorized;
        }
        out.views.push(view);
    }
    debug!(
        scope = scope.label(),
        students = out.views.len(),
        unavailable = out.views.iter().filter(|v| !v.is_loaded()).count(),
        "history reconciled"
    );
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProfile {
    pub student: Student,
    pub attendance: Option<AttendanceSummary>,
    pub recent_attendance: Vec<AttendanceRecord>,
    pub marks: Vec<GradedMark>,
    pub overall: Option<OverallGrade>,
    pub unavailable: Vec<&'static str>,
}

/// Everything the students screen shows for one student.
pub async fn student_profile(
    client: &dyn RecordClient,
    student_id: &str,
    limits: &Limits,
) -> EngineResult<StudentProfile> {
    let (students, attendance, marks) = futures::join!(
        remote::list_students(client),
        remote::list_attendance(client, Some(student_id)),
        remote::list_marks(client, Some(student_id)),
    );
    let student = students?
        .into_iter()
        .find(|s| s.student_id == student_id)
        .ok_or_else(|| EngineError::NotFound(format!("student {student_id}")))?;

    let mut unavailable = Vec::new();
    let mut recent_attendance = Vec::new();
    let mut summary = None;
    match attendance {
        Ok(mut records) => {
            records.retain(|r| r.student_id == student_id);
            summary = Some(calc::attendance_summary(&records));
            records.sort_by(|a, b| b.day().cmp(&a.day()));
            records.truncate(limits.recent_attendance);
            recent_attendance = records;
        }
        Err(RemoteError::Unauthorized) => return Err(EngineError::Unauthorized),
        Err(e) => {
            warn!(student = student_id, error = %e, "profile attendance unavailable");
            unavailable.push("attendance");
        }
    }

    let mut graded = Vec::new();
    let mut overall = None;
    match marks {
        Ok(mut marks) => {
            marks.retain(|m| m.student_id == student_id);
            marks.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
            overall = calc::overall_grade(&marks);
            graded = marks.into_iter().map(GradedMark::from).collect();
        }
        Err(RemoteError::Unauthorized) => return Err(EngineError::Unauthorized),
        Err(e) => {
            warn!(student = student_id, error = %e, "profile marks unavailable");
            unavailable.push("marks");
        }
    }

    Ok(StudentProfile {
        student,
        attendance: summary,
        recent_attendance,
        marks: graded,
        overall,
        unavailable,
    })
}

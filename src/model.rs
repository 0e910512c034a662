use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Record kinds served by the remote record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Student,
    Attendance,
    Mark,
    Homework,
    Notice,
    CalendarEvent,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Student => "student",
            EntityKind::Attendance => "attendance",
            EntityKind::Mark => "mark",
            EntityKind::Homework => "homework",
            EntityKind::Notice => "notice",
            EntityKind::CalendarEvent => "calendarEvent",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "student" | "students" => Some(EntityKind::Student),
            "attendance" => Some(EntityKind::Attendance),
            "mark" | "marks" => Some(EntityKind::Mark),
            "homework" | "assignment" | "assignments" => Some(EntityKind::Homework),
            "notice" | "notices" => Some(EntityKind::Notice),
            "calendarevent" | "calendar" | "event" | "events" => Some(EntityKind::CalendarEvent),
            _ => None,
        }
    }

    /// Collection segment under `/api/teachers/`.
    pub fn collection(self) -> &'static str {
        match self {
            EntityKind::Student => "students",
            EntityKind::Attendance => "Attendance",
            EntityKind::Mark => "Marks",
            EntityKind::Homework => "Homework",
            EntityKind::Notice => "Notice",
            EntityKind::CalendarEvent => "Calendar",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(rename = "studentID")]
    pub student_id: String,
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fathers_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mothers_name: Option<String>,
    #[serde(rename = "Address", default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub grade: i64,
    #[serde(default)]
    pub section: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_expiry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<String>,
}

impl Student {
    pub fn display_name(&self) -> String {
        match self.last_name.as_deref().map(str::trim) {
            Some(last) if !last.is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        }
    }

    pub fn session_active(&self, now: DateTime<Utc>) -> bool {
        self.session_expiry
            .as_deref()
            .and_then(parse_timestamp)
            .map(|exp| exp > now)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "present" => Some(AttendanceStatus::Present),
            "absent" => Some(AttendanceStatus::Absent),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Absent => "Absent",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "studentID")]
    pub student_id: String,
    pub date: String,
    pub status: AttendanceStatus,
    #[serde(default)]
    pub total_days: i64,
    #[serde(default)]
    pub total_present: i64,
}

impl AttendanceRecord {
    pub fn day(&self) -> Option<NaiveDate> {
        parse_date(&self.date)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExamType {
    Midterm,
    Final,
    #[serde(rename = "Class Test", alias = "ClassTest")]
    ClassTest,
}

impl ExamType {
    pub fn parse(raw: &str) -> Option<Self> {
        let folded: String = raw
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match folded.as_str() {
            "midterm" => Some(ExamType::Midterm),
            "final" => Some(ExamType::Final),
            "classtest" => Some(ExamType::ClassTest),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExamType::Midterm => "Midterm",
            ExamType::Final => "Final",
            ExamType::ClassTest => "Class Test",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Mark {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "studentID")]
    pub student_id: String,
    pub subject: String,
    pub marks_obtained: f64,
    pub total_marks: f64,
    pub exam_type: ExamType,
    pub semester: String,
    #[serde(default)]
    pub date: String,
}

impl Mark {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.date)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Homework {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "studentID")]
    pub student_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub assign_date: String,
    pub due_date: String,
    #[serde(default)]
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Homework {
    /// When the homework was created; falls back to `createdAt` and then the assign date.
    pub fn created(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.date)
            .or_else(|| self.created_at.as_deref().and_then(parse_timestamp))
            .or_else(|| parse_timestamp(&self.assign_date))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "classID", default)]
    pub class_id: String,
    #[serde(rename = "teacherID", default, skip_serializing_if = "Option::is_none")]
    pub teacher_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub date: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventCategory {
    Holiday,
    Exam,
    Event,
    Reminder,
    Other,
}

impl EventCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            EventCategory::Holiday => "Holiday",
            EventCategory::Exam => "Exam",
            EventCategory::Event => "Event",
            EventCategory::Reminder => "Reminder",
            EventCategory::Other => "Other",
        }
    }
}

impl From<String> for EventCategory {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "holiday" => EventCategory::Holiday,
            "exam" => EventCategory::Exam,
            "event" => EventCategory::Event,
            "reminder" => EventCategory::Reminder,
            _ => EventCategory::Other,
        }
    }
}

impl From<EventCategory> for String {
    fn from(c: EventCategory) -> Self {
        c.as_str().to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub date: String,
    #[serde(default = "default_category")]
    pub category: EventCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

fn default_category() -> EventCategory {
    EventCategory::Other
}

/// Accepts RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS[.fff]` (read as UTC) or a bare date
/// (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(t, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(t, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Calendar date of a wire date or timestamp (the part before `T`).
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let t = raw.trim();
    let head = t.split('T').next().unwrap_or(t);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

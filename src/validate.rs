//! Form checks applied before a record write leaves the daemon.

use crate::model::{parse_timestamp, AttendanceStatus, EntityKind, ExamType};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Field name to message.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(pub BTreeMap<String, String>);

impl FieldErrors {
    fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_insert_with(|| message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}: {v}")).collect();
        f.write_str(&parts.join("; "))
    }
}

fn text<'a>(payload: &'a Value, field: &str) -> Option<&'a str> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn number(payload: &Value, field: &str) -> Option<f64> {
    match payload.get(field)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Checks a create payload, or with `partial` set, only the fields an update carries.
pub fn check(kind: EntityKind, payload: &Value, partial: bool) -> Result<(), FieldErrors> {
    let mut errs = FieldErrors::default();
    if !payload.is_object() {
        errs.add("payload", "must be an object");
        return Err(errs);
    }
    let present = |field: &str| payload.get(field).is_some_and(|v| !v.is_null());
    let require = |errs: &mut FieldErrors, field: &str, label: &str| {
        if (!partial || present(field)) && text(payload, field).is_none() {
            errs.add(field, format!("{label} is required"));
        }
    };

    match kind {
        EntityKind::Student => {
            require(&mut errs, "studentID", "Student ID");
            require(&mut errs, "firstName", "First name");
            if (!partial || present("grade"))
                && payload.get("grade").and_then(Value::as_i64).is_none()
            {
                errs.add("grade", "Grade must be a whole number");
            }
        }
        EntityKind::Attendance => {
            require(&mut errs, "studentID", "Student");
            if (!partial || present("status"))
                && text(payload, "status").and_then(AttendanceStatus::parse).is_none()
            {
                errs.add("status", "Status must be Present or Absent");
            }
            if present("date") && text(payload, "date").and_then(parse_timestamp).is_none() {
                errs.add("date", "Date is not a valid date");
            }
        }
        EntityKind::Mark => {
            require(&mut errs, "studentID", "Student");
            require(&mut errs, "subject", "Subject");
            require(&mut errs, "semester", "Semester");
            if (!partial || present("examType"))
                && text(payload, "examType").and_then(ExamType::parse).is_none()
            {
                errs.add("examType", "Exam type must be Midterm, Final or Class Test");
            }
            let total = number(payload, "totalMarks");
            if !partial || present("totalMarks") {
                match total {
                    Some(t) if t > 0.0 => {}
                    _ => errs.add("totalMarks", "Total marks must be greater than 0"),
                }
            }
            if !partial || present("marksObtained") {
                match (number(payload, "marksObtained"), total) {
                    (None, _) => errs.add("marksObtained", "Marks obtained is required"),
                    (Some(v), _) if v < 0.0 => {
                        errs.add("marksObtained", "Marks obtained cannot be negative")
                    }
                    (Some(v), Some(t)) if v > t => {
                        errs.add("marksObtained", "Marks obtained cannot exceed total marks")
                    }
                    _ => {}
                }
            }
        }
        EntityKind::Homework => {
            require(&mut errs, "studentID", "Student");
            require(&mut errs, "title", "Title");
            require(&mut errs, "description", "Description");
            require(&mut errs, "assignDate", "Assign date");
            require(&mut errs, "dueDate", "Due date");
            let assign = text(payload, "assignDate").and_then(parse_timestamp);
            let due = text(payload, "dueDate").and_then(parse_timestamp);
            if let (Some(assign), Some(due)) = (assign, due) {
                if due <= assign {
                    errs.add("dueDate", "Due date must be after assign date");
                }
            }
        }
        EntityKind::Notice => {
            require(&mut errs, "title", "Title");
            require(&mut errs, "description", "Description");
            require(&mut errs, "classID", "Class");
            require(&mut errs, "date", "Date");
        }
        EntityKind::CalendarEvent => {
            require(&mut errs, "title", "Title");
            require(&mut errs, "date", "Date");
        }
    }

    if errs.is_empty() {
        Ok(())
    } else {
        Err(errs)
    }
}

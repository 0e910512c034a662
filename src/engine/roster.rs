use crate::model::Student;
use crate::remote::{self, RecordClient, RemoteError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterScope {
    pub grade: Option<i64>,
    pub section: Option<String>,
}

impl RosterScope {
    pub fn matches(&self, student: &Student) -> bool {
        if let Some(grade) = self.grade {
            if student.grade != grade {
                return false;
            }
        }
        if let Some(section) = self.section.as_deref() {
            if !student.section.eq_ignore_ascii_case(section) {
                return false;
            }
        }
        true
    }
}

/// Roster for one scope. A failed fetch leaves `students` empty and `error` set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Roster {
    pub scope: RosterScope,
    pub students: Vec<Student>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Roster {
    pub fn failed(scope: RosterScope, error: &RemoteError) -> Self {
        Self {
            scope,
            students: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

pub async fn assemble_roster(
    client: &dyn RecordClient,
    scope: &RosterScope,
) -> Result<Vec<Student>, RemoteError> {
    let all = remote::list_students(client).await.map_err(|e| {
        warn!(error = %e, "roster fetch failed");
        e
    })?;
    let total = all.len();
    let mut students: Vec<Student> = all.into_iter().filter(|s| scope.matches(s)).collect();
    students.sort_by(|a, b| {
        a.grade
            .cmp(&b.grade)
            .then_with(|| a.section.cmp(&b.section))
            .then_with(|| a.display_name().cmp(&b.display_name()))
            .then_with(|| a.student_id.cmp(&b.student_id))
    });
    debug!(total, matched = students.len(), "roster assembled");
    Ok(students)
}

/// Case-insensitive match on full name or student id.
pub fn search<'a>(students: &'a [Student], term: &str) -> Vec<&'a Student> {
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return students.iter().collect();
    }
    students
        .iter()
        .filter(|s| {
            s.display_name().to_lowercase().contains(&needle)
                || s.student_id.to_lowercase().contains(&needle)
        })
        .collect()
}

pub fn grade_distribution(students: &[Student]) -> BTreeMap<String, usize> {
    let mut out = BTreeMap::new();
    for s in students {
        *out.entry(format!("Grade {}", s.grade)).or_insert(0) += 1;
    }
    out
}

pub fn class_count(students: &[Student]) -> usize {
    students
        .iter()
        .map(|s| (s.grade, s.section.to_ascii_uppercase()))
        .collect::<HashSet<_>>()
        .len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{student, ScriptedClient};

    #[tokio::test]
    async fn filters_by_grade_and_section() {
        let client = ScriptedClient::new(vec![
            student("S1", "Asha", 7, "A"),
            student("S2", "Bilal", 7, "B"),
            student("S3", "Chen", 8, "A"),
        ]);
        let scope = RosterScope {
            grade: Some(7),
            section: Some("a".into()),
        };
        let roster = assemble_roster(&client, &scope).await.expect("roster");
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].student_id, "S1");

        let everyone = assemble_roster(&client, &RosterScope::default())
            .await
            .expect("roster");
        assert_eq!(everyone.len(), 3);
    }

    #[tokio::test]
    async fn failed_fetch_is_an_error_not_a_partial_roster() {
        let client = ScriptedClient::new(vec![student("S1", "Asha", 7, "A")]);
        client.fail_roster();
        let err = assemble_roster(&client, &RosterScope::default())
            .await
            .expect_err("should fail");
        assert!(matches!(err, RemoteError::Unavailable(_)));
    }

    #[test]
    fn search_and_distribution() {
        let students: Vec<Student> = [
            student("S1", "Asha", 7, "A"),
            student("S2", "Bilal", 7, "B"),
            student("X3", "Chen", 8, "A"),
        ]
        .into_iter()
        .map(|v| serde_json::from_value(v).expect("student"))
        .collect();
        assert_eq!(search(&students, "BIL").len(), 1);
        assert_eq!(search(&students, "x3").len(), 1);
        assert_eq!(search(&students, "  ").len(), 3);
        let dist = grade_distribution(&students);
        assert_eq!(dist.get("Grade 7"), Some(&2));
        assert_eq!(class_count(&students), 3);
    }
}

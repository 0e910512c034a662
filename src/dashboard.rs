use crate::calc::{self, ScoreState};
use crate::config::Limits;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::roster;
use crate::feed::{self, ActivityItem, HomeworkSummary, UpcomingItem};
use crate::model::{parse_timestamp, Notice};
use crate::remote::{self, RecordClient, RemoteError, RemoteResult};
use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Headline figures. A figure is `None` when its source could not be read, or for
/// percentages, when there is nothing to average.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_students: Option<usize>,
    pub total_classes: Option<usize>,
    pub homework_today: Option<usize>,
    pub today_attendance: Option<f64>,
    pub average_marks: Option<f64>,
    pub active_students: Option<usize>,
    pub recent_notices: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub stats: DashboardStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homework: Option<HomeworkSummary>,
    pub grade_distribution: BTreeMap<String, usize>,
    pub activity: Vec<ActivityItem>,
    pub upcoming: Vec<UpcomingItem>,
    pub unavailable: Vec<&'static str>,
    pub generated_at: DateTime<Utc>,
}

fn settle<T>(
    source: &'static str,
    result: RemoteResult<Vec<T>>,
    unavailable: &mut Vec<&'static str>,
) -> EngineResult<Option<Vec<T>>> {
    match result {
        Ok(rows) => Ok(Some(rows)),
        Err(RemoteError::Unauthorized) => Err(EngineError::Unauthorized),
        Err(e) => {
            warn!(source, error = %e, "dashboard source unavailable");
            unavailable.push(source);
            Ok(None)
        }
    }
}

fn is_recent(notice: &Notice, now: DateTime<Utc>, days: i64) -> bool {
    parse_timestamp(&notice.date)
        .map(|at| (now - at).num_seconds() as f64 / 86_400.0 <= days as f64)
        .unwrap_or(false)
}

/// Reads every source concurrently and derives the dashboard. A failed source only
/// blanks the figures that depend on it; an expired session fails the whole call.
/// "Today" is the calendar day at `local_now`'s offset, the same day attendance commits use.
pub async fn open_dashboard(
    client: &dyn RecordClient,
    limits: &Limits,
    local_now: DateTime<FixedOffset>,
) -> EngineResult<Dashboard> {
    let (students, homework, marks, attendance, notices, events) = futures::join!(
        remote::list_students(client),
        remote::list_homework(client),
        remote::list_marks(client, None),
        remote::list_attendance(client, None),
        remote::list_notices(client),
        remote::list_calendar_events(client),
    );
    let mut unavailable = Vec::new();
    let students = settle("students", students, &mut unavailable)?;
    let homework = settle("homework", homework, &mut unavailable)?;
    let marks = settle("marks", marks, &mut unavailable)?;
    let attendance = settle("attendance", attendance, &mut unavailable)?;
    let notices = settle("notices", notices, &mut unavailable)?;
    let events = settle("calendar", events, &mut unavailable)?;

    let now = local_now.with_timezone(&Utc);
    let offset = *local_now.offset();
    let today = local_now.date_naive();
    let stats = DashboardStats {
        total_students: students.as_ref().map(Vec::len),
        total_classes: students.as_deref().map(roster::class_count),
        homework_today: homework.as_ref().map(|hw| {
            hw.iter()
                .filter(|h| h.created().map(|c| c.with_timezone(&offset).date_naive()) == Some(today))
                .count()
        }),
        today_attendance: attendance
            .as_deref()
            .and_then(|records| calc::class_attendance_for_date(records, today))
            .map(calc::round_percent),
        average_marks: marks
            .as_deref()
            .and_then(|marks| {
                calc::class_average(marks.iter().map(|m| ScoreState::Scored {
                    obtained: m.marks_obtained,
                    out_of: m.total_marks,
                }))
            })
            .map(calc::round_percent),
        active_students: students
            .as_ref()
            .map(|s| s.iter().filter(|s| s.session_active(now)).count()),
        recent_notices: notices.as_ref().map(|n| {
            n.iter()
                .filter(|n| is_recent(n, now, limits.recent_notice_days))
                .count()
        }),
    };

    let activity = feed::activity_feed(
        homework.as_deref().unwrap_or_default(),
        attendance.as_deref().unwrap_or_default(),
        marks.as_deref().unwrap_or_default(),
        notices.as_deref().unwrap_or_default(),
        now,
        limits.activity_per_source,
        limits.activity_max,
    );
    let upcoming = feed::upcoming_events(
        homework.as_deref().unwrap_or_default(),
        events.as_deref().unwrap_or_default(),
        now,
        limits.upcoming_max,
    );

    debug!(
        activity = activity.len(),
        upcoming = upcoming.len(),
        unavailable = unavailable.len(),
        "dashboard assembled"
    );
    Ok(Dashboard {
        stats,
        homework: homework.as_deref().map(|hw| feed::homework_summary(hw, local_now)),
        grade_distribution: students
            .as_deref()
            .map(roster::grade_distribution)
            .unwrap_or_default(),
        activity,
        upcoming,
        unavailable,
        generated_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{attendance, mark, student, ScriptedClient};
    use crate::model::EntityKind;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn stats_over_every_source() {
        let mut asha = student("S1", "Asha", 7, "A");
        asha["sessionExpiry"] = json!("2024-03-11T00:00:00Z");
        let client = ScriptedClient::new(vec![
            asha,
            student("S2", "Bilal", 7, "A"),
            student("S3", "Chen", 8, "B"),
        ]);
        client.seed(
            EntityKind::Attendance,
            vec![
                attendance("a1", "S1", "2024-03-10", "Present", 1, 1),
                attendance("a2", "S2", "2024-03-10", "Absent", 1, 0),
                attendance("a3", "S3", "2024-03-10", "Present", 1, 1),
            ],
        );
        client.seed(
            EntityKind::Mark,
            vec![
                mark("m1", "S1", "Mathematics", "Midterm", "Spring 2024", 85.0, 100.0, "2024-03-01"),
                mark("m2", "S2", "Mathematics", "Midterm", "Spring 2024", 30.0, 50.0, "2024-03-02"),
            ],
        );
        client.seed(
            EntityKind::Notice,
            vec![
                json!({ "_id": "n1", "classID": "7A", "title": "Trip", "description": "x", "date": "2024-03-05" }),
                json!({ "_id": "n2", "classID": "7A", "title": "Old", "description": "x", "date": "2024-01-05" }),
            ],
        );

        let dash = open_dashboard(&client, &Limits::default(), now().fixed_offset())
            .await
            .expect("dashboard");
        assert!(dash.unavailable.is_empty());
        assert_eq!(dash.stats.total_students, Some(3));
        assert_eq!(dash.stats.total_classes, Some(2));
        assert_eq!(dash.stats.today_attendance, Some(67.0));
        assert_eq!(dash.stats.average_marks, Some(73.0));
        assert_eq!(dash.stats.active_students, Some(1));
        assert_eq!(dash.stats.recent_notices, Some(1));
        assert_eq!(dash.stats.homework_today, Some(0));
        assert_eq!(dash.grade_distribution.get("Grade 7"), Some(&2));
        assert!(dash.activity.len() <= 8);
        assert!(dash.upcoming.is_empty());
    }

    #[tokio::test]
    async fn failed_source_is_reported_not_zeroed() {
        let client = ScriptedClient::new(vec![student("S1", "Asha", 7, "A")]);
        client.fail_roster();
        let dash = open_dashboard(&client, &Limits::default(), now().fixed_offset())
            .await
            .expect("dashboard");
        assert_eq!(dash.unavailable, vec!["students"]);
        assert_eq!(dash.stats.total_students, None);
        assert_eq!(dash.stats.today_attendance, None);
        assert_eq!(dash.stats.recent_notices, Some(0));
    }

    #[tokio::test]
    async fn today_follows_the_local_calendar_day() {
        let client = ScriptedClient::new(vec![
            student("S1", "Asha", 7, "A"),
            student("S2", "Bilal", 7, "A"),
        ]);
        client.seed(
            EntityKind::Attendance,
            vec![
                attendance("a1", "S1", "2024-03-10", "Absent", 1, 0),
                attendance("a2", "S1", "2024-03-11", "Present", 2, 1),
                attendance("a3", "S2", "2024-03-11", "Present", 1, 1),
            ],
        );
        client.seed(
            EntityKind::Homework,
            vec![json!({
                "_id": "h1", "studentID": "S1", "title": "Essay", "description": "x",
                "assignDate": "2024-03-11", "dueDate": "2024-03-15",
                "date": "2024-03-10T16:00:00Z"
            })],
        );
        // 20:00 UTC on the 10th is already the morning of the 11th at +10:00.
        let offset = FixedOffset::east_opt(10 * 3600).expect("offset");
        let local_now = Utc
            .with_ymd_and_hms(2024, 3, 10, 20, 0, 0)
            .unwrap()
            .with_timezone(&offset);
        let dash = open_dashboard(&client, &Limits::default(), local_now)
            .await
            .expect("dashboard");
        assert_eq!(dash.stats.today_attendance, Some(100.0));
        assert_eq!(dash.stats.homework_today, Some(1));
        assert_eq!(dash.homework.map(|h| h.assigned_today), Some(1));
        assert_eq!(dash.generated_at, local_now.with_timezone(&Utc));
    }
}

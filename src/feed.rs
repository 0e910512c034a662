//! Time-ordered feeds for the dashboard.

use crate::model::{
    parse_date, parse_timestamp, AttendanceRecord, CalendarEvent, EventCategory, Homework, Mark,
    Notice,
};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;

/// Human time since `at`, as shown next to feed items.
pub fn relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let hours = (now - at).num_hours();
    if hours < 1 {
        return "just now".to_string();
    }
    if hours < 24 {
        return format!("{hours} hours ago");
    }
    match hours / 24 {
        1 => "yesterday".to_string(),
        days if days < 7 => format!("{days} days ago"),
        _ => at.format("%b %d").to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ActivityKind {
    Assignment,
    Attendance,
    Marks,
    Notice,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    pub at: DateTime<Utc>,
    pub time: String,
}

fn newest<'a, T>(
    items: &'a [T],
    stamp: impl Fn(&T) -> Option<DateTime<Utc>>,
    cap: usize,
) -> Vec<(&'a T, DateTime<Utc>)> {
    let mut dated: Vec<(&'a T, DateTime<Utc>)> = items
        .iter()
        .filter_map(|item| stamp(item).map(|at| (item, at)))
        .collect();
    dated.sort_by(|a, b| b.1.cmp(&a.1));
    dated.truncate(cap);
    dated
}

/// Most recent items per source, merged and then cut to `max`. Records without a
/// readable timestamp are left out.
pub fn activity_feed(
    homework: &[Homework],
    attendance: &[AttendanceRecord],
    marks: &[Mark],
    notices: &[Notice],
    now: DateTime<Utc>,
    per_source: usize,
    max: usize,
) -> Vec<ActivityItem> {
    let item = |id: &str, kind, title: &str, description: String, class, at| ActivityItem {
        id: id.to_string(),
        kind,
        title: title.to_string(),
        description,
        class,
        at,
        time: relative_time(at, now),
    };

    let mut feed = Vec::new();
    for (hw, at) in newest(homework, Homework::created, per_source) {
        feed.push(item(
            &hw.id,
            ActivityKind::Assignment,
            "Assignment Created",
            hw.title.clone(),
            Some(format!("Student: {}", hw.student_id)),
            at,
        ));
    }
    for (att, at) in newest(attendance, |a| parse_timestamp(&a.date), per_source) {
        feed.push(item(
            &att.id,
            ActivityKind::Attendance,
            "Attendance Marked",
            format!("{} for student {}", att.status.as_str(), att.student_id),
            Some(format!("Student: {}", att.student_id)),
            at,
        ));
    }
    for (mark, at) in newest(marks, Mark::timestamp, per_source) {
        feed.push(item(
            &mark.id,
            ActivityKind::Marks,
            "Marks Entered",
            format!("{}: {}/{}", mark.subject, mark.marks_obtained, mark.total_marks),
            Some(format!("Student: {}", mark.student_id)),
            at,
        ));
    }
    for (notice, at) in newest(notices, |n| parse_timestamp(&n.date), per_source) {
        feed.push(item(
            &notice.id,
            ActivityKind::Notice,
            "Notice Sent",
            notice.title.clone(),
            Some(notice.class_id.clone()).filter(|c| !c.is_empty()),
            at,
        ));
    }

    feed.sort_by(|a, b| b.at.cmp(&a.at));
    feed.truncate(max);
    feed
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UpcomingKind {
    Assignment,
    Holiday,
    Exam,
    Event,
    Reminder,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingItem {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: UpcomingKind,
    pub date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
}

/// Homework due after `now` and calendar events after `now`, soonest first.
pub fn upcoming_events(
    homework: &[Homework],
    events: &[CalendarEvent],
    now: DateTime<Utc>,
    max: usize,
) -> Vec<UpcomingItem> {
    let due = homework.iter().filter_map(|hw| {
        let date = parse_timestamp(&hw.due_date).filter(|d| *d > now)?;
        Some(UpcomingItem {
            id: hw.id.clone(),
            title: hw.title.clone(),
            kind: UpcomingKind::Assignment,
            date,
            description: Some(hw.description.clone()).filter(|d| !d.is_empty()),
            class: Some(format!("Student: {}", hw.student_id)),
        })
    });
    let scheduled = events.iter().filter_map(|ev| {
        let date = parse_timestamp(&ev.date).filter(|d| *d > now)?;
        let kind = match ev.category {
            EventCategory::Holiday => UpcomingKind::Holiday,
            EventCategory::Exam => UpcomingKind::Exam,
            EventCategory::Event => UpcomingKind::Event,
            EventCategory::Reminder => UpcomingKind::Reminder,
            EventCategory::Other => UpcomingKind::Other,
        };
        Some(UpcomingItem {
            id: ev.id.clone(),
            title: ev.title.clone(),
            kind,
            date,
            description: ev.description.clone(),
            class: None,
        })
    });

    let mut items: Vec<UpcomingItem> = due.chain(scheduled).collect();
    items.sort_by(|a, b| a.date.cmp(&b.date));
    items.truncate(max);
    items
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HomeworkStatus {
    Overdue,
    DueToday,
    Active,
}

/// Status by calendar day of the due date. Unreadable due dates count as active.
pub fn homework_status(hw: &Homework, today: NaiveDate) -> HomeworkStatus {
    match parse_date(&hw.due_date) {
        Some(due) if due < today => HomeworkStatus::Overdue,
        Some(due) if due == today => HomeworkStatus::DueToday,
        _ => HomeworkStatus::Active,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeworkSummary {
    pub total: usize,
    pub assigned_today: usize,
    pub due_today: usize,
    pub active: usize,
    pub overdue: usize,
}

/// Counts by calendar day at `now`'s offset.
pub fn homework_summary(homework: &[Homework], now: DateTime<FixedOffset>) -> HomeworkSummary {
    let today = now.date_naive();
    let mut s = HomeworkSummary {
        total: homework.len(),
        ..HomeworkSummary::default()
    };
    for hw in homework {
        if hw.created().map(|c| c.with_timezone(now.offset()).date_naive()) == Some(today) {
            s.assigned_today += 1;
        }
        match homework_status(hw, today) {
            HomeworkStatus::Overdue => s.overdue += 1,
            HomeworkStatus::DueToday => s.due_today += 1,
            HomeworkStatus::Active => s.active += 1,
        }
    }
    s
}

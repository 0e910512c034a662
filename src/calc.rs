use crate::engine::reconcile::Presence;
use crate::model::{AttendanceRecord, AttendanceStatus, Mark};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreState {
    NoMark,
    Scored { obtained: f64, out_of: f64 },
}

impl ScoreState {
    pub fn percentage(self) -> Option<f64> {
        match self {
            ScoreState::NoMark => None,
            ScoreState::Scored { obtained, out_of } => mark_percentage(obtained, out_of),
        }
    }
}

impl From<Option<(f64, f64)>> for ScoreState {
    fn from(score: Option<(f64, f64)>) -> Self {
        match score {
            Some((obtained, out_of)) => ScoreState::Scored { obtained, out_of },
            None => ScoreState::NoMark,
        }
    }
}

/// Whole-number rounding used for dashboard figures.
pub fn round_percent(x: f64) -> f64 {
    x.round()
}

pub fn round_1_decimal(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum LetterGrade {
    #[serde(rename = "A+")]
    APlus,
    A,
    B,
    C,
    D,
    F,
}

pub fn letter_grade(percentage: f64) -> LetterGrade {
    match percentage {
        p if p >= 90.0 => LetterGrade::APlus,
        p if p >= 80.0 => LetterGrade::A,
        p if p >= 70.0 => LetterGrade::B,
        p if p >= 60.0 => LetterGrade::C,
        p if p >= 40.0 => LetterGrade::D,
        _ => LetterGrade::F,
    }
}

/// Cumulative attendance; 0 when no days have been recorded.
pub fn attendance_percentage(total_present: i64, total_days: i64) -> f64 {
    if total_days <= 0 {
        return 0.0;
    }
    total_present as f64 / total_days as f64 * 100.0
}

/// `None` for a mark with a non-positive total.
pub fn mark_percentage(obtained: f64, total: f64) -> Option<f64> {
    (total > 0.0).then(|| obtained / total * 100.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub total_days: i64,
    pub total_present: i64,
    pub percentage: f64,
}

/// Totals come from the latest cumulative record.
pub fn attendance_summary(records: &[AttendanceRecord]) -> AttendanceSummary {
    let latest = records
        .iter()
        .enumerate()
        .max_by(|(ia, a), (ib, b)| a.day().cmp(&b.day()).then(ia.cmp(ib)))
        .map(|(_, r)| r);
    let (total_days, total_present) = latest
        .map(|r| (r.total_days, r.total_present))
        .unwrap_or((0, 0));
    AttendanceSummary {
        total_days,
        total_present,
        percentage: attendance_percentage(total_present, total_days),
    }
}

/// Share of present records on `date`; `None` when nobody has a record that day.
pub fn class_attendance_for_date<'a, I>(records: I, date: NaiveDate) -> Option<f64>
where
    I: IntoIterator<Item = &'a AttendanceRecord>,
{
    let mut total = 0usize;
    let mut present = 0usize;
    for r in records.into_iter().filter(|r| r.day() == Some(date)) {
        total += 1;
        if r.status == AttendanceStatus::Present {
            present += 1;
        }
    }
    (total > 0).then(|| present as f64 / total as f64 * 100.0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DaySummary {
    pub date: NaiveDate,
    pub records: usize,
    pub present: usize,
    pub absent: usize,
    pub percentage: f64,
}

/// Per-day counts, newest day first. Records with an unreadable date are skipped.
pub fn attendance_history<'a, I>(records: I) -> Vec<DaySummary>
where
    I: IntoIterator<Item = &'a AttendanceRecord>,
{
    let mut days: BTreeMap<NaiveDate, (usize, usize)> = BTreeMap::new();
    for r in records {
        let Some(day) = r.day() else { continue };
        let slot = days.entry(day).or_default();
        match r.status {
            AttendanceStatus::Present => slot.0 += 1,
            AttendanceStatus::Absent => slot.1 += 1,
        }
    }
    days.into_iter()
        .rev()
        .map(|(date, (present, absent))| {
            let records = present + absent;
            DaySummary {
                date,
                records,
                present,
                absent,
                percentage: round_1_decimal(present as f64 / records as f64 * 100.0),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceTally {
    pub present: usize,
    pub absent: usize,
    pub unmarked: usize,
    pub unavailable: usize,
    /// Present over marked students; `None` when nobody is marked.
    pub percentage: Option<f64>,
}

/// `None` items are students whose history could not be loaded.
pub fn presence_tally<I>(presences: I) -> PresenceTally
where
    I: IntoIterator<Item = Option<Presence>>,
{
    let mut t = PresenceTally::default();
    for p in presences {
        match p {
            Some(Presence::Present) => t.present += 1,
            Some(Presence::Absent) => t.absent += 1,
            Some(Presence::Unmarked) => t.unmarked += 1,
            None => t.unavailable += 1,
        }
    }
    let marked = t.present + t.absent;
    t.percentage = (marked > 0).then(|| t.present as f64 / marked as f64 * 100.0);
    t
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkStatistics {
    pub count: usize,
    pub no_mark_count: usize,
    pub average: f64,
    pub highest: f64,
    pub lowest: f64,
    pub passed: usize,
}

/// Statistics over resolved marks, in percent. `None` when nothing is resolved.
pub fn mark_statistics<I>(scores: I, pass_percentage: f64) -> Option<MarkStatistics>
where
    I: IntoIterator<Item = ScoreState>,
{
    let mut count = 0usize;
    let mut no_mark_count = 0usize;
    let mut sum = 0.0;
    let mut highest = f64::MIN;
    let mut lowest = f64::MAX;
    let mut passed = 0usize;

    for s in scores {
        let Some(pct) = s.percentage() else {
            no_mark_count += 1;
            continue;
        };
        count += 1;
        sum += pct;
        highest = highest.max(pct);
        lowest = lowest.min(pct);
        if pct >= pass_percentage {
            passed += 1;
        }
    }

    (count > 0).then(|| MarkStatistics {
        count,
        no_mark_count,
        average: sum / count as f64,
        highest,
        lowest,
        passed,
    })
}

pub fn class_average<I>(scores: I) -> Option<f64>
where
    I: IntoIterator<Item = ScoreState>,
{
    mark_statistics(scores, 0.0).map(|s| s.average)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradedMark {
    #[serde(flatten)]
    pub mark: Mark,
    pub percentage: Option<f64>,
    pub letter: Option<LetterGrade>,
}

impl From<Mark> for GradedMark {
    fn from(mark: Mark) -> Self {
        let percentage = mark_percentage(mark.marks_obtained, mark.total_marks);
        Self {
            letter: percentage.map(letter_grade),
            percentage: percentage.map(round_1_decimal),
            mark,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallGrade {
    pub obtained: f64,
    pub total: f64,
    pub percentage: f64,
    pub letter: LetterGrade,
}

/// Sum obtained over sum total across every mark.
pub fn overall_grade(marks: &[Mark]) -> Option<OverallGrade> {
    let obtained: f64 = marks.iter().map(|m| m.marks_obtained).sum();
    let total: f64 = marks.iter().map(|m| m.total_marks).sum();
    let percentage = mark_percentage(obtained, total)?;
    Some(OverallGrade {
        obtained,
        total,
        percentage: round_1_decimal(percentage),
        letter: letter_grade(percentage),
    })
}

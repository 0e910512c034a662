//! Roster, history and pending edits for one teacher session.
//!
//! State sits behind a plain mutex that is only taken between awaits. Every scope
//! change bumps `generation`; fan-out and commit results started under an older
//! generation are dropped instead of being folded into the new view. Only one
//! commit runs at a time.

pub mod commit;
pub mod error;
pub mod overlay;
pub mod reconcile;
pub mod roster;

#[cfg(test)]
pub(crate) mod testing;

use crate::calc::{self, DaySummary, MarkStatistics, PresenceTally, ScoreState};
use crate::config::Limits;
use crate::model::Student;
use crate::remote::{self, RecordClient};
use chrono::{NaiveDate, Utc};
use commit::{CommitFailure, CommitReport};
use error::{EngineError, EngineResult};
use overlay::{DirtyEntry, DirtyValue, EditOverlay};
use reconcile::{HistoryScope, HistoryStatus, Presence, Reconciled, StudentView};
use roster::{Roster, RosterScope};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

#[derive(Default)]
struct EngineState {
    generation: u64,
    roster: Option<Roster>,
    scope: Option<HistoryScope>,
    views: Vec<StudentView>,
    warnings: Vec<String>,
    overlay: EditOverlay,
    committing: bool,
}

impl EngineState {
    fn change_scope(&mut self) -> u64 {
        self.generation += 1;
        self.overlay.confirm_all();
        let dropped = self.overlay.clear();
        if dropped > 0 {
            info!(dropped, "pending edits discarded on scope change");
        }
        self.views.clear();
        self.warnings.clear();
        self.generation
    }

    fn view(&self, student_id: &str) -> EngineResult<&StudentView> {
        let view = self
            .views
            .iter()
            .find(|v| v.student_id() == student_id)
            .ok_or_else(|| EngineError::UnknownStudent(student_id.to_string()))?;
        if !view.is_loaded() {
            return Err(EngineError::HistoryUnavailable(student_id.to_string()));
        }
        Ok(view)
    }

    fn require_scope(&self, label: &'static str) -> EngineResult<&HistoryScope> {
        match &self.scope {
            Some(scope) if scope.label() == label => Ok(scope),
            _ => Err(EngineError::NoHistoryScope(label)),
        }
    }

    fn fold(&mut self, out: Reconciled) {
        self.views = out.views;
        self.warnings = out.warnings;
        if !self.committing {
            self.overlay.confirm_all();
        }
        let views = &self.views;
        self.overlay.rebase(|sid| {
            views
                .iter()
                .find(|v| v.student_id() == sid)
                .and_then(StudentView::baseline_id)
        });
    }
}

/// Holds the commit slot; releasing it lets the next commit start.
struct CommitSlot<'a> {
    engine: &'a Engine,
}

impl Drop for CommitSlot<'_> {
    fn drop(&mut self) {
        self.engine.lock().committing = false;
    }
}

/// The engine state the UI renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub generation: u64,
    pub roster: Option<RosterScope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roster_error: Option<String>,
    pub scope: Option<HistoryScope>,
    pub students: Vec<StudentView>,
    pub dirty: usize,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tally: Option<PresenceTally>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_attendance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mark_stats: Option<MarkStatistics>,
}

pub struct Engine {
    client: Arc<dyn RecordClient>,
    limits: Limits,
    state: Mutex<EngineState>,
}

impl Engine {
    pub fn new(client: Arc<dyn RecordClient>, limits: Limits) -> Self {
        Self {
            client,
            limits,
            state: Mutex::new(EngineState::default()),
        }
    }

    pub fn client(&self) -> &dyn RecordClient {
        self.client.as_ref()
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        // A panic while holding the lock leaves plain data behind; keep serving.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn dirty_count(&self) -> usize {
        self.lock().overlay.len()
    }

    /// Loads the roster for `scope` and reloads the open history view over it.
    /// Pending edits are dropped. A failed fetch leaves an explicitly errored, empty
    /// roster.
    pub async fn select_roster(&self, scope: RosterScope) -> EngineResult<Roster> {
        let (generation, history) = {
            let mut st = self.lock();
            st.roster = None;
            (st.change_scope(), st.scope.clone())
        };
        let fetched = roster::assemble_roster(self.client(), &scope).await;

        let roster = {
            let mut st = self.lock();
            if st.generation != generation {
                debug!(generation, current = st.generation, "stale roster dropped");
                return Err(EngineError::Superseded);
            }
            match fetched {
                Ok(students) => {
                    info!(count = students.len(), grade = ?scope.grade, section = ?scope.section, "roster selected");
                    let roster = Roster {
                        scope,
                        students,
                        error: None,
                    };
                    st.roster = Some(roster.clone());
                    roster
                }
                Err(e) => {
                    st.roster = Some(Roster::failed(scope, &e));
                    return Err(e.into());
                }
            }
        };
        if let Some(history) = history {
            self.load_history(generation, &roster.students, &history)
                .await?;
        }
        Ok(roster)
    }

    /// Opens an attendance date or a mark scope over the loaded roster.
    pub async fn select_history(&self, scope: HistoryScope) -> EngineResult<Snapshot> {
        let (generation, students) = {
            let mut st = self.lock();
            let students = match &st.roster {
                Some(r) => r.students.clone(),
                None => return Err(EngineError::NoRoster),
            };
            st.scope = Some(scope.clone());
            (st.change_scope(), students)
        };
        info!(scope = scope.label(), students = students.len(), "history scope opened");
        self.load_history(generation, &students, &scope).await?;
        self.snapshot()
    }

    /// Reloads the open scope from the record source. Pending edits survive.
    pub async fn refresh(&self) -> EngineResult<Snapshot> {
        let (generation, students, scope) = {
            let st = self.lock();
            let students = match &st.roster {
                Some(r) => r.students.clone(),
                None => return Err(EngineError::NoRoster),
            };
            let Some(scope) = st.scope.clone() else {
                return Err(EngineError::NoHistoryScope("history"));
            };
            (st.generation, students, scope)
        };
        self.load_history(generation, &students, &scope).await?;
        self.snapshot()
    }

    async fn load_history(
        &self,
        generation: u64,
        students: &[Student],
        scope: &HistoryScope,
    ) -> EngineResult<()> {
        let out = reconcile::reconcile(self.client(), students, scope).await;
        let unauthorized = out.unauthorized;
        let mut st = self.lock();
        if st.generation != generation {
            debug!(generation, current = st.generation, "stale history dropped");
            return Err(EngineError::Superseded);
        }
        st.fold(out);
        if unauthorized {
            return Err(EngineError::Unauthorized);
        }
        Ok(())
    }

    pub fn snapshot(&self) -> EngineResult<Snapshot> {
        let st = self.lock();
        let roster = st.roster.as_ref();
        let students: Vec<StudentView> = match &st.scope {
            Some(_) => st
                .views
                .iter()
                .cloned()
                .map(|mut v| {
                    v.pending = st.overlay.get(v.student_id()).map(|e| e.value.clone());
                    v
                })
                .collect(),
            None => roster
                .map(|r| {
                    r.students
                        .iter()
                        .cloned()
                        .map(|student| StudentView {
                            student,
                            history: HistoryStatus::Loaded,
                            presence: None,
                            attendance: None,
                            current_mark: None,
                            pending: None,
                        })
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default(),
        };

        let (tally, class_attendance, mark_stats) = match &st.scope {
            Some(HistoryScope::Attendance { date }) => (
                Some(calc::presence_tally(
                    students.iter().map(StudentView::effective_presence),
                )),
                calc::class_attendance_for_date(
                    st.views.iter().filter_map(|v| v.attendance.as_ref()),
                    *date,
                ),
                None,
            ),
            Some(HistoryScope::Marks(_)) => (
                None,
                None,
                calc::mark_statistics(
                    st.views.iter().filter(|v| v.is_loaded()).map(|v| {
                        let score = v.current_mark.as_ref().map(|m| (m.marks_obtained, m.total_marks));
                        ScoreState::from(score)
                    }),
                    self.limits.pass_percentage,
                ),
            ),
            None => (None, None, None),
        };

        Ok(Snapshot {
            generation: st.generation,
            roster: roster.map(|r| r.scope.clone()),
            roster_error: roster.and_then(|r| r.error.clone()),
            scope: st.scope.clone(),
            students,
            dirty: st.overlay.len(),
            warnings: st.warnings.clone(),
            tally,
            class_attendance,
            mark_stats,
        })
    }

    pub fn mark_statistics(&self) -> EngineResult<Option<MarkStatistics>> {
        self.lock().require_scope("marks")?;
        Ok(self.snapshot()?.mark_stats)
    }

    /// Records a presence edit. `Unmarked`, or a value equal to the baseline, drops
    /// the pending edit instead, unless a write for the student was sent since the
    /// last reload. Returns the number of pending edits.
    pub fn set_presence(&self, student_id: &str, presence: Presence) -> EngineResult<usize> {
        let mut st = self.lock();
        st.require_scope("attendance")?;
        let unconfirmed = st.overlay.is_unconfirmed(student_id);
        let view = st.view(student_id)?;
        let entry = match presence.status() {
            Some(status) if unconfirmed || view.presence != Some(presence) => Some(DirtyEntry {
                student_id: student_id.to_string(),
                value: DirtyValue::Presence { status },
                baseline: view.baseline_id(),
            }),
            _ => None,
        };
        match entry {
            Some(entry) => {
                st.overlay.set(entry);
            }
            None => {
                st.overlay.remove(student_id);
            }
        }
        Ok(st.overlay.len())
    }

    /// Applies one presence to every student with loaded history.
    pub fn mark_all(&self, presence: Presence) -> EngineResult<usize> {
        let ids: Vec<String> = {
            let st = self.lock();
            st.require_scope("attendance")?;
            st.views
                .iter()
                .filter(|v| v.is_loaded())
                .map(|v| v.student_id().to_string())
                .collect()
        };
        let mut dirty = self.dirty_count();
        for id in ids {
            dirty = self.set_presence(&id, presence)?;
        }
        Ok(dirty)
    }

    /// Records a mark edit, checked against the baseline total (or the default total
    /// for a student without a mark in this scope).
    pub fn set_mark(&self, student_id: &str, marks_obtained: f64) -> EngineResult<usize> {
        let mut st = self.lock();
        st.require_scope("marks")?;
        let unconfirmed = st.overlay.is_unconfirmed(student_id);
        let view = st.view(student_id)?;
        let total_marks = view
            .current_mark
            .as_ref()
            .map(|m| m.total_marks)
            .unwrap_or(self.limits.default_total_marks);
        if !marks_obtained.is_finite() || marks_obtained < 0.0 || marks_obtained > total_marks {
            return Err(EngineError::ValidationFailed(format!(
                "mark for {student_id} must be between 0 and {total_marks}"
            )));
        }
        let unchanged = view
            .current_mark
            .as_ref()
            .is_some_and(|m| m.marks_obtained == marks_obtained);
        if unchanged && !unconfirmed {
            st.overlay.remove(student_id);
        } else {
            let entry = DirtyEntry {
                student_id: student_id.to_string(),
                value: DirtyValue::Mark {
                    marks_obtained,
                    total_marks,
                },
                baseline: view.baseline_id(),
            };
            st.overlay.set(entry);
        }
        Ok(st.overlay.len())
    }

    /// Drops one student's pending edit, or all of them. Returns how many were dropped.
    pub fn discard(&self, student_id: Option<&str>) -> usize {
        let mut st = self.lock();
        match student_id {
            Some(id) => usize::from(st.overlay.remove(id).is_some()),
            None => st.overlay.clear(),
        }
    }

    /// Writes every pending edit. Successful entries are cleared and failed ones stay
    /// pending; when every write succeeds the scope is reloaded. A second commit
    /// while one is running is refused with `CommitInProgress`.
    pub async fn commit(&self, today: NaiveDate) -> EngineResult<CommitReport> {
        let (generation, writes) = {
            let mut st = self.lock();
            let Some(scope) = st.scope.as_ref() else {
                return Err(EngineError::NoHistoryScope("history"));
            };
            if st.committing {
                return Err(EngineError::CommitInProgress);
            }
            commit::check_window(scope, today)?;
            if st.overlay.is_empty() {
                debug!("nothing to commit");
                return Ok(CommitReport::default());
            }
            let entries = st.overlay.entries();
            let writes = commit::plan_writes(scope, entries.clone(), Utc::now())?;
            st.overlay.begin_writes(&entries);
            st.committing = true;
            (st.generation, writes)
        };
        let slot = CommitSlot { engine: self };
        let attempted = writes.len();
        info!(attempted, "committing pending edits");
        let outcomes = commit::issue(self.client(), writes).await;

        let mut report = CommitReport {
            attempted,
            ..CommitReport::default()
        };
        {
            let mut st = self.lock();
            if st.generation != generation {
                warn!(attempted, "commit finished after the scope changed; results dropped");
                return Err(EngineError::Superseded);
            }
            for outcome in outcomes {
                match outcome.result {
                    Ok(body) => {
                        match outcome.verb {
                            "create" => report.created += 1,
                            _ => report.updated += 1,
                        }
                        let id = body.get("_id").and_then(|v| v.as_str()).map(String::from);
                        st.overlay.settle(&outcome.entry, id);
                    }
                    Err(e) => {
                        let e = EngineError::from(e);
                        warn!(student = %outcome.entry.student_id, error = %e, "write failed");
                        st.overlay.write_failed(&outcome.entry.student_id);
                        report.failed.push(CommitFailure {
                            student_id: outcome.entry.student_id.clone(),
                            code: e.code(),
                            message: e.to_string(),
                        });
                    }
                }
            }
            report.retained = st.overlay.len();
        }
        drop(slot);
        info!(
            created = report.created,
            updated = report.updated,
            failed = report.failed.len(),
            "commit finished"
        );

        if report.failed.is_empty() {
            match self.refresh().await {
                Ok(_) => report.refreshed = true,
                Err(e) => warn!(error = %e, "reload after commit failed"),
            }
        }
        Ok(report)
    }

    /// Per-day attendance summaries, limited to the loaded roster when there is one.
    pub async fn attendance_history(&self) -> EngineResult<Vec<DaySummary>> {
        let members: Option<Vec<String>> = self
            .lock()
            .roster
            .as_ref()
            .filter(|r| r.error.is_none())
            .map(|r| r.students.iter().map(|s| s.student_id.clone()).collect());
        let records = remote::list_attendance(self.client(), None).await?;
        let kept = records.iter().filter(|r| match &members {
            Some(ids) => ids.contains(&r.student_id),
            None => true,
        });
        Ok(calc::attendance_history(kept))
    }
}

use crate::model::AttendanceStatus;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// A pending value for one student in the open scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "field", rename_all = "camelCase")]
pub enum DirtyValue {
    Presence {
        status: AttendanceStatus,
    },
    #[serde(rename_all = "camelCase")]
    Mark {
        marks_obtained: f64,
        total_marks: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirtyEntry {
    pub student_id: String,
    pub value: DirtyValue,
    /// Record the edit will update; `None` means a create.
    pub baseline: Option<String>,
}

/// Uncommitted edits keyed by student id. Baseline records are never touched here.
#[derive(Debug, Default)]
pub struct EditOverlay {
    entries: BTreeMap<String, DirtyEntry>,
    /// Students with a write sent since the last reload. Their loaded baseline may
    /// be older than what the store holds.
    unconfirmed: BTreeSet<String>,
}

impl EditOverlay {
    pub fn set(&mut self, entry: DirtyEntry) -> Option<DirtyEntry> {
        self.entries.insert(entry.student_id.clone(), entry)
    }

    pub fn remove(&mut self, student_id: &str) -> Option<DirtyEntry> {
        self.entries.remove(student_id)
    }

    pub fn get(&self, student_id: &str) -> Option<&DirtyEntry> {
        self.entries.get(student_id)
    }

    /// Marks a batch as sent.
    pub fn begin_writes(&mut self, batch: &[DirtyEntry]) {
        self.unconfirmed
            .extend(batch.iter().map(|e| e.student_id.clone()));
    }

    /// A failed write left the store as it was loaded.
    pub fn write_failed(&mut self, student_id: &str) {
        self.unconfirmed.remove(student_id);
    }

    pub fn is_unconfirmed(&self, student_id: &str) -> bool {
        self.unconfirmed.contains(student_id)
    }

    /// Called once a reload has replaced every baseline.
    pub fn confirm_all(&mut self) {
        self.unconfirmed.clear();
    }

    /// Drops pending edits. Markers for sent writes stay until the next reload.
    pub fn clear(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> Vec<DirtyEntry> {
        self.entries.values().cloned().collect()
    }

    /// Points creates at a record that appeared in a reload.
    pub fn rebase<F>(&mut self, baseline_of: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for entry in self.entries.values_mut() {
            if entry.baseline.is_none() {
                entry.baseline = baseline_of(&entry.student_id);
            }
        }
    }

    /// Clears an entry after its write succeeded. If the teacher edited the same
    /// student again while the write was in flight, the newer value stays and is
    /// pointed at `record_id` so the next commit updates instead of creating twice.
    pub fn settle(&mut self, submitted: &DirtyEntry, record_id: Option<String>) {
        let Some(current) = self.entries.get_mut(&submitted.student_id) else {
            return;
        };
        if current.value == submitted.value {
            self.entries.remove(&submitted.student_id);
        } else if current.baseline.is_none() {
            current.baseline = record_id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn present(sid: &str, baseline: Option<&str>) -> DirtyEntry {
        DirtyEntry {
            student_id: sid.into(),
            value: DirtyValue::Presence {
                status: AttendanceStatus::Present,
            },
            baseline: baseline.map(String::from),
        }
    }

    #[test]
    fn last_write_wins_per_student() {
        let mut overlay = EditOverlay::default();
        overlay.set(present("S1", None));
        let mut absent = present("S1", None);
        absent.value = DirtyValue::Presence {
            status: AttendanceStatus::Absent,
        };
        let replaced = overlay.set(absent.clone());
        assert!(replaced.is_some());
        assert_eq!(overlay.len(), 1);
        assert_eq!(overlay.get("S1"), Some(&absent));
    }

    #[test]
    fn settle_keeps_a_newer_edit_and_repoints_it() {
        let mut overlay = EditOverlay::default();
        let submitted = present("S1", None);
        overlay.set(submitted.clone());
        let mut newer = present("S1", None);
        newer.value = DirtyValue::Presence {
            status: AttendanceStatus::Absent,
        };
        overlay.set(newer);

        overlay.settle(&submitted, Some("rec-9".into()));
        let kept = overlay.get("S1").expect("newer edit kept");
        assert_eq!(kept.baseline.as_deref(), Some("rec-9"));

        overlay.set(present("S2", Some("rec-2")));
        overlay.settle(&present("S2", Some("rec-2")), Some("rec-2".into()));
        assert!(overlay.get("S2").is_none());
        assert_eq!(overlay.clear(), 1);
        assert!(overlay.is_empty());
    }

    #[test]
    fn sent_writes_stay_unconfirmed_until_reload() {
        let mut overlay = EditOverlay::default();
        let batch = vec![present("S1", Some("a1")), present("S2", None)];
        for entry in &batch {
            overlay.set(entry.clone());
        }
        overlay.begin_writes(&batch);
        overlay.write_failed("S2");
        assert_eq!(overlay.clear(), 2);
        assert!(overlay.is_unconfirmed("S1"));
        assert!(!overlay.is_unconfirmed("S2"));
        overlay.confirm_all();
        assert!(!overlay.is_unconfirmed("S1"));
    }
}

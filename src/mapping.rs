use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use chrono_tz::Tz;
use std::collections::BTreeMap;

use crate::models::{NewTimeEntry, SourceTimeEntry};

/// Source task id (as a string key) to destination project id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskProjectMapping {
    entries: BTreeMap<String, u64>,
}

impl TaskProjectMapping {
    pub fn new(entries: BTreeMap<String, u64>) -> Self {
        Self { entries }
    }

    pub fn project_for(&self, task_id: u64) -> Option<u64> {
        self.entries.get(&task_id.to_string()).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, u64)> for TaskProjectMapping {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// A source entry translated into the destination's terms.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedEntry {
    pub source_id: u64,
    pub project_id: u64,
    pub description: String,
    pub start: DateTime<FixedOffset>,
    pub duration_seconds: f64,
    pub billed: bool,
}

impl MappedEntry {
    /// Duration snapped to milliseconds, so `1.13 * 3600.0` reads as 4068
    /// rather than 4067.9999999999995.
    fn snapped_seconds(&self) -> f64 {
        (self.duration_seconds * 1000.0).round() / 1000.0
    }

    /// Whole seconds sent to the destination. Fractions are floored.
    pub fn whole_seconds(&self) -> i64 {
        self.snapped_seconds().floor() as i64
    }

    pub fn to_new_time_entry(&self, created_with: &str) -> NewTimeEntry {
        let duration = self.whole_seconds();
        let dropped = self.snapped_seconds() - duration as f64;
        if dropped > 0.0 {
            log::debug!(
                "Entry {}: dropping {dropped:.3}s of {}s to send whole seconds",
                self.source_id,
                self.duration_seconds
            );
        }
        NewTimeEntry {
            description: self.description.clone(),
            pid: self.project_id,
            start: self.start.to_rfc3339(),
            duration,
            created_with: created_with.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MappingOutcome {
    Mapped(MappedEntry),
    Unmapped { task_id: u64 },
}

pub fn seconds_from_hours(hours: f64) -> f64 {
    hours * 3600.0
}

/// Midnight of `date` in `tz`. Ambiguous midnights resolve to the earlier
/// instant; a midnight skipped by a DST jump is read as UTC.
pub fn local_midnight(date: NaiveDate, tz: &Tz) -> DateTime<FixedOffset> {
    let midnight = date.and_time(chrono::NaiveTime::MIN);
    let result = tz.from_local_datetime(&midnight);
    result
        .earliest()
        .or_else(|| result.latest())
        .map(|value| value.fixed_offset())
        .unwrap_or_else(|| tz.from_utc_datetime(&midnight).fixed_offset())
}

pub fn map_entry(entry: &SourceTimeEntry, mapping: &TaskProjectMapping, tz: &Tz) -> MappingOutcome {
    let Some(project_id) = mapping.project_for(entry.task_id) else {
        return MappingOutcome::Unmapped {
            task_id: entry.task_id,
        };
    };

    MappingOutcome::Mapped(MappedEntry {
        source_id: entry.id,
        project_id,
        description: entry.notes.clone(),
        start: local_midnight(entry.date, tz),
        duration_seconds: seconds_from_hours(entry.hours),
        billed: entry.billed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::Los_Angeles;

    fn entry(task_id: u64, hours: f64, date: &str, notes: &str) -> SourceTimeEntry {
        SourceTimeEntry {
            id: 211,
            staff_id: 1,
            project_id: 58,
            task_id,
            hours,
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            notes: notes.to_string(),
            billed: false,
        }
    }

    fn mapping() -> TaskProjectMapping {
        [("5".to_string(), 3118555), ("6".to_string(), 3118555)]
            .into_iter()
            .collect()
    }

    #[test]
    fn seconds_from_hours_is_exact() {
        assert_eq!(seconds_from_hours(0.0), 0.0);
        assert_eq!(seconds_from_hours(1.0), 3600.0);
        assert_eq!(seconds_from_hours(1.5), 5400.0);
        assert_eq!(seconds_from_hours(0.25), 900.0);
        assert!((seconds_from_hours(0.0001) - 0.36).abs() < 0.001);
    }

    #[test]
    fn maps_design_entry() {
        let outcome = map_entry(&entry(5, 1.5, "2014-02-01", "design"), &mapping(), &Los_Angeles);
        let MappingOutcome::Mapped(mapped) = outcome else {
            panic!("expected a mapped entry");
        };
        assert_eq!(mapped.project_id, 3118555);
        assert_eq!(mapped.description, "design");
        assert_eq!(mapped.duration_seconds, 5400.0);
        assert_eq!(mapped.start.to_rfc3339(), "2014-02-01T00:00:00-08:00");
    }

    #[test]
    fn summer_dates_use_daylight_offset() {
        let start = local_midnight(NaiveDate::from_ymd_opt(2014, 7, 1).unwrap(), &Los_Angeles);
        assert_eq!(start.to_rfc3339(), "2014-07-01T00:00:00-07:00");
    }

    #[test]
    fn unknown_task_is_unmapped() {
        let outcome = map_entry(&entry(99, 2.0, "2014-02-01", "misc"), &mapping(), &Los_Angeles);
        assert_eq!(outcome, MappingOutcome::Unmapped { task_id: 99 });
    }

    #[test]
    fn distinct_tasks_can_share_a_project() {
        let first = map_entry(&entry(5, 1.0, "2014-02-01", "a"), &mapping(), &Los_Angeles);
        let second = map_entry(&entry(6, 1.0, "2014-02-01", "b"), &mapping(), &Los_Angeles);
        match (first, second) {
            (MappingOutcome::Mapped(a), MappingOutcome::Mapped(b)) => {
                assert_eq!(a.project_id, b.project_id);
            }
            other => panic!("expected both mapped, got {other:?}"),
        }
    }

    #[test]
    fn float_error_does_not_lose_a_second() {
        for (hours, expected) in [(1.13, 4068), (2.01, 7236), (2.03, 7308), (4.1, 14760)] {
            let MappingOutcome::Mapped(mapped) =
                map_entry(&entry(5, hours, "2014-02-01", "call"), &mapping(), &Los_Angeles)
            else {
                panic!("expected a mapped entry");
            };
            assert_eq!(mapped.whole_seconds(), expected, "hours {hours}");
            assert_eq!(mapped.to_new_time_entry("test").duration, expected);
        }
    }

    #[test]
    fn wire_entry_floors_fractional_seconds() {
        let MappingOutcome::Mapped(mapped) =
            map_entry(&entry(5, 0.3333, "2014-02-01", "call"), &mapping(), &Los_Angeles)
        else {
            panic!("expected a mapped entry");
        };
        let wire = mapped.to_new_time_entry("Freshbooks to Toggl");
        assert_eq!(wire.duration, 1199);
        assert_eq!(wire.pid, 3118555);
        assert_eq!(wire.start, "2014-02-01T00:00:00-08:00");
        assert_eq!(wire.created_with, "Freshbooks to Toggl");
    }
}

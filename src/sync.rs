use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::dates::DateRange;
use crate::error::Result;
use crate::freshbooks::FreshbooksClient;
use crate::mapping::{MappedEntry, MappingOutcome, TaskProjectMapping, map_entry};
use crate::models::{NewTimeEntry, SourceTimeEntry, TimeEntryQuery, TogglTimeEntry};
use crate::toggl::TogglClient;

pub trait TimeEntrySource {
    fn time_entries(&self, query: &TimeEntryQuery) -> Result<Vec<SourceTimeEntry>>;
}

pub trait TimeEntryDestination {
    fn project_tasks(&self, project_id: u64) -> Result<Value>;
    fn time_entries(&self, start: &str, end: &str) -> Result<Vec<TogglTimeEntry>>;
    fn create_time_entry(&self, entry: &NewTimeEntry) -> Result<()>;
}

impl TimeEntrySource for FreshbooksClient {
    fn time_entries(&self, query: &TimeEntryQuery) -> Result<Vec<SourceTimeEntry>> {
        self.list_time_entries(query)
    }
}

impl TimeEntryDestination for TogglClient {
    fn project_tasks(&self, project_id: u64) -> Result<Value> {
        self.list_project_tasks(project_id)
    }

    fn time_entries(&self, start: &str, end: &str) -> Result<Vec<TogglTimeEntry>> {
        self.list_time_entries(start, end)
    }

    fn create_time_entry(&self, entry: &NewTimeEntry) -> Result<()> {
        TogglClient::create_time_entry(self, entry)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Submit every mapped record, even if an identical entry already exists.
    Allow,
    /// Skip records already present in the destination, one skip per existing entry.
    #[default]
    SkipExisting,
}

#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub range: DateRange,
    pub source_project_id: u64,
    pub commit: bool,
    pub duplicates: DuplicatePolicy,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub fetched: usize,
    pub mapped: usize,
    pub skipped_unmapped: usize,
    pub skipped_existing: usize,
    pub submitted: usize,
    pub failed: usize,
    pub pending: Vec<PendingEntry>,
}

/// A record a dry run would have submitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingEntry {
    pub billed: bool,
    pub time_entry: NewTimeEntry,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Fingerprint {
    project_id: u64,
    start: i64,
    duration: i64,
    description: String,
}

impl Fingerprint {
    fn of_mapped(entry: &MappedEntry) -> Self {
        Self {
            project_id: entry.project_id,
            start: entry.start.timestamp(),
            duration: entry.whole_seconds(),
            description: entry.description.clone(),
        }
    }

    fn of_existing(entry: &TogglTimeEntry) -> Option<Self> {
        let start = DateTime::parse_from_rfc3339(&entry.start).ok()?;
        Some(Self {
            project_id: entry.pid?,
            start: start.timestamp(),
            duration: entry.duration,
            description: entry.description.clone().unwrap_or_default(),
        })
    }
}

pub struct SyncPipeline<'a, S, D> {
    source: &'a S,
    destination: &'a D,
    mapping: &'a TaskProjectMapping,
    timezone: Tz,
    created_with: String,
}

impl<'a, S, D> SyncPipeline<'a, S, D>
where
    S: TimeEntrySource,
    D: TimeEntryDestination,
{
    pub fn new(
        source: &'a S,
        destination: &'a D,
        mapping: &'a TaskProjectMapping,
        timezone: Tz,
        created_with: impl Into<String>,
    ) -> Self {
        Self {
            source,
            destination,
            mapping,
            timezone,
            created_with: created_with.into(),
        }
    }

    pub fn list_entries(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        source_project_id: u64,
    ) -> Result<Vec<SourceTimeEntry>> {
        self.source.time_entries(&TimeEntryQuery {
            project_id: source_project_id,
            date_from: start,
            date_to: end,
            task_id: None,
        })
    }

    pub fn list_destination_tasks(&self, destination_project_id: u64) -> Result<Value> {
        self.destination.project_tasks(destination_project_id)
    }

    pub fn sync(&self, request: &SyncRequest) -> Result<SyncReport> {
        let entries = self.list_entries(
            request.range.start(),
            request.range.end(),
            request.source_project_id,
        )?;
        let mut report = SyncReport {
            fetched: entries.len(),
            ..SyncReport::default()
        };

        let mut existing = match request.duplicates {
            DuplicatePolicy::SkipExisting => self.existing_fingerprints(&request.range)?,
            DuplicatePolicy::Allow => {
                if request.commit {
                    log::warn!(
                        "Duplicate check disabled; entries already in Toggl for {} will be created again",
                        request.range.label()
                    );
                }
                HashMap::new()
            }
        };

        for entry in &entries {
            let mapped = match map_entry(entry, self.mapping, &self.timezone) {
                MappingOutcome::Mapped(mapped) => mapped,
                MappingOutcome::Unmapped { task_id } => {
                    log::info!("Skipping entry {}: task {task_id} has no Toggl project", entry.id);
                    report.skipped_unmapped += 1;
                    continue;
                }
            };
            report.mapped += 1;

            if let Some(remaining) = existing.get_mut(&Fingerprint::of_mapped(&mapped)) {
                if *remaining > 0 {
                    *remaining -= 1;
                    log::info!("Skipping entry {}: already present in Toggl", entry.id);
                    report.skipped_existing += 1;
                    continue;
                }
            }

            let time_entry = mapped.to_new_time_entry(&self.created_with);
            if !request.commit {
                report.pending.push(PendingEntry {
                    billed: mapped.billed,
                    time_entry,
                });
                continue;
            }

            match self.destination.create_time_entry(&time_entry) {
                Ok(()) => report.submitted += 1,
                Err(err) if err.is_auth() => return Err(err),
                Err(err) => {
                    log::error!("Failed to create Toggl entry for {}: {err}", entry.id);
                    report.failed += 1;
                }
            }
        }

        log::info!(
            "fetched {}, mapped {}, skipped {} unmapped and {} existing, submitted {}, failed {}",
            report.fetched,
            report.mapped,
            report.skipped_unmapped,
            report.skipped_existing,
            report.submitted,
            report.failed
        );
        Ok(report)
    }

    /// How many Toggl entries in the range carry each fingerprint.
    fn existing_fingerprints(&self, range: &DateRange) -> Result<HashMap<Fingerprint, usize>> {
        let (from, to) = range.as_rfc3339(&self.timezone);
        let mut counts = HashMap::new();
        for fingerprint in self
            .destination
            .time_entries(&from, &to)?
            .iter()
            .filter_map(Fingerprint::of_existing)
        {
            *counts.entry(fingerprint).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

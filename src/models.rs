use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A FreshBooks time entry after validation at the client boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceTimeEntry {
    pub id: u64,
    pub staff_id: u64,
    pub project_id: u64,
    pub task_id: u64,
    pub hours: f64,
    pub date: NaiveDate,
    pub notes: String,
    pub billed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceClientRecord {
    pub id: u64,
    pub organization: String,
    pub contact_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceProject {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub rate: Option<f64>,
    pub bill_method: String,
    pub client_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceTask {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub billable: bool,
    pub rate: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TogglTimeEntry {
    pub id: u64,
    #[serde(default)]
    pub pid: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
    pub duration: i64,
    pub start: String,
    #[serde(default)]
    pub stop: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTimeEntry {
    pub description: String,
    pub pid: u64,
    pub start: String,
    pub duration: i64,
    pub created_with: String,
}

#[derive(Debug, Serialize)]
pub struct CreateTimeEntryRequest<'a> {
    pub time_entry: &'a NewTimeEntry,
}

/// Filter for a FreshBooks `time_entry.list` call.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeEntryQuery {
    pub project_id: u64,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub task_id: Option<u64>,
}

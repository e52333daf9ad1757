use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::NaiveDate;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::config::Config;
use crate::error::{Error, Platform, Result};
use crate::models::{SourceClientRecord, SourceProject, SourceTask, SourceTimeEntry, TimeEntryQuery};
use crate::retry::with_retry;

const USER_AGENT: &str = "Freshbooks to Toggl Sync";

/// Client for the FreshBooks classic XML API.
pub struct FreshbooksClient {
    client: Client,
    endpoint: String,
    token: String,
    max_retries: u32,
}

impl FreshbooksClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|err| Error::Network(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: config.freshbooks_endpoint.clone(),
            token: config.freshbooks_api_token.clone(),
            max_retries: config.max_retries,
        })
    }

    pub fn list_clients(&self) -> Result<Vec<SourceClientRecord>> {
        let xml = self.call("client.list", &[])?;
        parse_clients(&xml)
    }

    pub fn list_projects(&self) -> Result<Vec<SourceProject>> {
        let xml = self.call("project.list", &[])?;
        parse_projects(&xml)
    }

    pub fn list_tasks(&self, project_id: Option<u64>) -> Result<Vec<SourceTask>> {
        let params: Vec<(&str, String)> = project_id
            .map(|id| vec![("project_id", id.to_string())])
            .unwrap_or_default();
        let xml = self.call("task.list", &params)?;
        parse_tasks(&xml)
    }

    /// Fetches every page of entries matching `query`, in page order.
    pub fn list_time_entries(&self, query: &TimeEntryQuery) -> Result<Vec<SourceTimeEntry>> {
        let first = self.fetch_time_entry_page(query, 1)?;
        log::info!("Page count: {}", first.pages);
        let entries = collect_pages(first, |page| self.fetch_time_entry_page(query, page))?;
        log::info!("Number of time entries: {}", entries.len());
        Ok(entries)
    }

    fn fetch_time_entry_page(&self, query: &TimeEntryQuery, page: u32) -> Result<TimeEntryPage> {
        let mut params = vec![("project_id", query.project_id.to_string())];
        if let Some(task_id) = query.task_id {
            params.push(("task_id", task_id.to_string()));
        }
        params.push(("date_from", format_date(query.date_from)));
        params.push(("date_to", format_date(query.date_to)));
        params.push(("page", page.to_string()));

        let xml = self.call("time_entry.list", &params)?;
        parse_time_entry_page(&xml)
    }

    fn call(&self, method: &str, params: &[(&str, String)]) -> Result<String> {
        let body = request_body(method, params)?;
        with_retry(method, self.max_retries, Error::is_retryable, || {
            self.send(method, body.clone())
        })
    }

    fn send(&self, method: &str, body: String) -> Result<String> {
        log::debug!("FreshBooks {method} -> {}", self.endpoint);
        let credentials = STANDARD.encode(format!("{}:X", self.token));
        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/xml")
            .header("Authorization", format!("Basic {}", credentials))
            .body(body)
            .send()
            .map_err(|err| Error::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::from_status(Platform::FreshBooks, status));
        }

        let xml = response
            .text()
            .map_err(|err| Error::Network(err.to_string()))?;
        check_envelope(&xml)?;
        Ok(xml)
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Builds `<request method="...">` with one child element per parameter.
fn request_body(method: &str, params: &[(&str, String)]) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(encode_error)?;
    writer
        .write_event(Event::Start(
            BytesStart::new("request").with_attributes([("method", method)]),
        ))
        .map_err(encode_error)?;
    for (name, value) in params {
        writer
            .write_event(Event::Start(BytesStart::new(*name)))
            .map_err(encode_error)?;
        writer
            .write_event(Event::Text(BytesText::new(value)))
            .map_err(encode_error)?;
        writer
            .write_event(Event::End(BytesEnd::new(*name)))
            .map_err(encode_error)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("request")))
        .map_err(encode_error)?;
    String::from_utf8(writer.into_inner()).map_err(encode_error)
}

fn encode_error<E: std::fmt::Display>(err: E) -> Error {
    Error::encode(Platform::FreshBooks, err.to_string())
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "@status", default)]
    status: String,
    #[serde(default)]
    error: Option<String>,
}

fn decode<T: DeserializeOwned>(xml: &str) -> Result<T> {
    quick_xml::de::from_str(xml).map_err(|err| Error::parse(Platform::FreshBooks, err.to_string()))
}

fn check_envelope(xml: &str) -> Result<()> {
    let envelope: Envelope = decode(xml)?;
    match envelope.status.as_str() {
        "ok" => Ok(()),
        "fail" => Err(Error::remote(
            Platform::FreshBooks,
            envelope.error.unwrap_or_else(|| "request failed".to_string()),
        )),
        other => Err(Error::parse(
            Platform::FreshBooks,
            format!("unexpected response status \"{other}\""),
        )),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeEntryPage {
    pub page: u32,
    pub pages: u32,
    pub entries: Vec<SourceTimeEntry>,
}

/// Concatenates `first` with pages `2..=first.pages`, fetched in order.
pub fn collect_pages<F>(first: TimeEntryPage, mut fetch: F) -> Result<Vec<SourceTimeEntry>>
where
    F: FnMut(u32) -> Result<TimeEntryPage>,
{
    let pages = first.pages;
    let mut entries = first.entries;
    for page in 2..=pages {
        let next = fetch(page)?;
        log::debug!("Fetched page {}/{pages}", next.page);
        entries.extend(next.entries);
    }
    Ok(entries)
}

#[derive(Debug, Deserialize)]
struct TimeEntriesResponse {
    time_entries: TimeEntriesXml,
}

#[derive(Debug, Deserialize)]
struct TimeEntriesXml {
    #[serde(rename = "@page", default)]
    page: u32,
    #[serde(rename = "@pages", default)]
    pages: u32,
    #[serde(rename = "time_entry", default)]
    entries: Vec<TimeEntryXml>,
}

#[derive(Debug, Deserialize)]
struct TimeEntryXml {
    time_entry_id: Option<String>,
    staff_id: Option<String>,
    project_id: Option<String>,
    task_id: Option<String>,
    hours: Option<String>,
    date: Option<String>,
    notes: Option<String>,
    billed: Option<String>,
}

impl TryFrom<TimeEntryXml> for SourceTimeEntry {
    type Error = Error;

    fn try_from(xml: TimeEntryXml) -> Result<Self> {
        let id = required_id("time_entry_id", xml.time_entry_id)?;
        let hours = required_text("hours", xml.hours)?;
        let hours = hours.parse::<f64>().map_err(|_| {
            Error::parse(
                Platform::FreshBooks,
                format!("time entry {id}: hours \"{hours}\" is not a number"),
            )
        })?;
        if !hours.is_finite() || hours < 0.0 {
            return Err(Error::parse(
                Platform::FreshBooks,
                format!("time entry {id}: hours {hours} is out of range"),
            ));
        }
        let date = required_text("date", xml.date)?;
        let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|_| {
            Error::parse(
                Platform::FreshBooks,
                format!("time entry {id}: invalid date \"{date}\""),
            )
        })?;

        Ok(SourceTimeEntry {
            id,
            staff_id: required_id("staff_id", xml.staff_id)?,
            project_id: required_id("project_id", xml.project_id)?,
            task_id: required_id("task_id", xml.task_id)?,
            hours,
            date,
            notes: xml.notes.unwrap_or_default(),
            billed: is_flag_set(xml.billed),
        })
    }
}

pub fn parse_time_entry_page(xml: &str) -> Result<TimeEntryPage> {
    let response: TimeEntriesResponse = decode(xml)?;
    let entries = response
        .time_entries
        .entries
        .into_iter()
        .map(SourceTimeEntry::try_from)
        .collect::<Result<Vec<_>>>()?;
    Ok(TimeEntryPage {
        page: response.time_entries.page,
        pages: response.time_entries.pages,
        entries,
    })
}

#[derive(Debug, Deserialize)]
struct ClientsResponse {
    clients: ClientsXml,
}

#[derive(Debug, Deserialize)]
struct ClientsXml {
    #[serde(rename = "client", default)]
    clients: Vec<ClientXml>,
}

#[derive(Debug, Deserialize)]
struct ClientXml {
    client_id: Option<String>,
    organization: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
}

fn parse_clients(xml: &str) -> Result<Vec<SourceClientRecord>> {
    let response: ClientsResponse = decode(xml)?;
    response
        .clients
        .clients
        .into_iter()
        .map(|client| {
            let contact = [client.first_name, client.last_name]
                .into_iter()
                .flatten()
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            Ok(SourceClientRecord {
                id: required_id("client_id", client.client_id)?,
                organization: client.organization.unwrap_or_default(),
                contact_name: non_empty(Some(contact)),
                email: non_empty(client.email),
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct ProjectsResponse {
    projects: ProjectsXml,
}

#[derive(Debug, Deserialize)]
struct ProjectsXml {
    #[serde(rename = "project", default)]
    projects: Vec<ProjectXml>,
}

#[derive(Debug, Deserialize)]
struct ProjectXml {
    project_id: Option<String>,
    name: Option<String>,
    description: Option<String>,
    rate: Option<String>,
    bill_method: Option<String>,
    client_id: Option<String>,
}

fn parse_projects(xml: &str) -> Result<Vec<SourceProject>> {
    let response: ProjectsResponse = decode(xml)?;
    response
        .projects
        .projects
        .into_iter()
        .map(|project| {
            Ok(SourceProject {
                id: required_id("project_id", project.project_id)?,
                name: project.name.unwrap_or_default(),
                description: project.description.unwrap_or_default(),
                rate: optional_number("rate", project.rate)?,
                bill_method: project.bill_method.unwrap_or_default(),
                client_id: optional_id("client_id", project.client_id)?,
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct TasksResponse {
    tasks: TasksXml,
}

#[derive(Debug, Deserialize)]
struct TasksXml {
    #[serde(rename = "task", default)]
    tasks: Vec<TaskXml>,
}

#[derive(Debug, Deserialize)]
struct TaskXml {
    task_id: Option<String>,
    name: Option<String>,
    description: Option<String>,
    billable: Option<String>,
    rate: Option<String>,
}

fn parse_tasks(xml: &str) -> Result<Vec<SourceTask>> {
    let response: TasksResponse = decode(xml)?;
    response
        .tasks
        .tasks
        .into_iter()
        .map(|task| {
            Ok(SourceTask {
                id: required_id("task_id", task.task_id)?,
                name: task.name.unwrap_or_default(),
                description: task.description.unwrap_or_default(),
                billable: is_flag_set(task.billable),
                rate: optional_number("rate", task.rate)?,
            })
        })
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn required_text(field: &str, value: Option<String>) -> Result<String> {
    non_empty(value)
        .ok_or_else(|| Error::parse(Platform::FreshBooks, format!("missing <{field}>")))
}

fn required_id(field: &str, value: Option<String>) -> Result<u64> {
    optional_id(field, value)?
        .ok_or_else(|| Error::parse(Platform::FreshBooks, format!("missing <{field}>")))
}

fn optional_id(field: &str, value: Option<String>) -> Result<Option<u64>> {
    non_empty(value)
        .map(|text| {
            text.parse::<u64>().map_err(|_| {
                Error::parse(
                    Platform::FreshBooks,
                    format!("<{field}> \"{text}\" is not an id"),
                )
            })
        })
        .transpose()
}

fn optional_number(field: &str, value: Option<String>) -> Result<Option<f64>> {
    non_empty(value)
        .map(|text| {
            text.parse::<f64>().map_err(|_| {
                Error::parse(
                    Platform::FreshBooks,
                    format!("<{field}> \"{text}\" is not a number"),
                )
            })
        })
        .transpose()
}

fn is_flag_set(value: Option<String>) -> bool {
    non_empty(value).as_deref() == Some("1")
}

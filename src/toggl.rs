use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::Config;
use crate::error::{Error, Platform, Result};
use crate::models::{CreateTimeEntryRequest, NewTimeEntry, TogglTimeEntry};
use crate::retry::with_retry;

#[derive(Clone)]
pub struct TogglClient {
    client: Client,
    base: String,
    token: String,
    max_retries: u32,
}

impl TogglClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .user_agent("fb2toggl")
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|err| Error::Network(err.to_string()))?;
        Ok(Self {
            client,
            base: config.toggl_api_base.clone(),
            token: config.toggl_api_token.clone(),
            max_retries: config.max_retries,
        })
    }

    pub fn list_workspaces(&self) -> Result<Value> {
        self.fetch(build_url(&self.base, "workspaces", &[])?)
    }

    pub fn list_workspace_projects(&self, workspace_id: u64) -> Result<Value> {
        let section = format!("workspaces/{workspace_id}/projects");
        self.fetch(build_url(&self.base, &section, &[])?)
    }

    pub fn list_project_tasks(&self, project_id: u64) -> Result<Value> {
        let section = format!("projects/{project_id}/tasks");
        self.fetch(build_url(&self.base, &section, &[])?)
    }

    /// Entries starting in `[start, end)`, both RFC 3339 timestamps.
    pub fn list_time_entries(&self, start: &str, end: &str) -> Result<Vec<TogglTimeEntry>> {
        let url = build_url(
            &self.base,
            "time_entries",
            &[("start_date", start), ("end_date", end)],
        )?;
        let entries: Option<Vec<TogglTimeEntry>> = self.fetch(url)?;
        Ok(entries.unwrap_or_default())
    }

    pub fn sum_tracked_hours(&self, start: &str, end: &str) -> Result<f64> {
        let entries = self.list_time_entries(start, end)?;
        Ok(tracked_hours(&entries))
    }

    pub fn create_time_entry(&self, entry: &NewTimeEntry) -> Result<()> {
        let url = build_url(&self.base, "time_entries", &[])?;
        let body = serde_json::to_vec(&CreateTimeEntryRequest { time_entry: entry })
            .map_err(|err| Error::encode(Platform::Toggl, err.to_string()))?;
        // A timed out POST may already have been applied, so only a 429 is safe to replay.
        with_retry(
            "Toggl create time entry",
            self.max_retries,
            |err| matches!(err, Error::RateLimited(_)),
            || {
                log::debug!("Toggl POST {url}");
                let response = self
                    .authorized(self.client.post(url.clone()))
                    .body(body.clone())
                    .send()
                    .map_err(|err| Error::Network(err.to_string()))?;
                if !response.status().is_success() {
                    return Err(Error::from_status(Platform::Toggl, response.status()));
                }
                Ok(())
            },
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let credentials = STANDARD.encode(format!("{}:api_token", self.token));
        request
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Basic {}", credentials))
    }

    fn fetch<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        with_retry("Toggl request", self.max_retries, Error::is_retryable, || {
            self.fetch_once(url.clone())
        })
    }

    fn fetch_once<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        log::debug!("Toggl GET {url}");
        let response = self
            .authorized(self.client.get(url))
            .send()
            .map_err(|err| Error::Network(err.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::from_status(Platform::Toggl, response.status()));
        }

        let body = response
            .text()
            .map_err(|err| Error::Network(err.to_string()))?;
        decode_body(&body)
    }
}

/// Section URL under `base`, with a query string only when `params` is non-empty.
pub fn build_url(base: &str, section: &str, params: &[(&str, &str)]) -> Result<Url> {
    let raw = format!("{}/{}", base.trim_end_matches('/'), section);
    let url = if params.is_empty() {
        Url::parse(&raw)
    } else {
        Url::parse_with_params(&raw, params)
    };
    url.map_err(|err| Error::Config(format!("Invalid Toggl URL {raw}: {err}")))
}

/// An empty body decodes as JSON `null`.
fn decode_body<T: DeserializeOwned>(body: &str) -> Result<T> {
    let body = if body.trim().is_empty() { "null" } else { body };
    serde_json::from_str(body).map_err(|err| Error::parse(Platform::Toggl, err.to_string()))
}

/// Completed hours; running entries report a negative duration and count as zero.
pub fn tracked_hours(entries: &[TogglTimeEntry]) -> f64 {
    let seconds: i64 = entries.iter().map(|entry| entry.duration.max(0)).sum();
    seconds as f64 / 3600.0
}

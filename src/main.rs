use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;

mod cli;
mod config;
mod dates;
mod error;
mod freshbooks;
mod mapping;
mod models;
mod retry;
mod sync;
mod toggl;

use cli::{Args, Command};
use config::Config;
use dates::DateRange;
use error::{Error, Result};
use freshbooks::FreshbooksClient;
use sync::{DuplicatePolicy, SyncPipeline, SyncRequest};
use toggl::TogglClient;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match run(args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let config = Config::load(args.config.as_deref())?;
    let freshbooks = FreshbooksClient::new(&config)?;
    let toggl = TogglClient::new(&config)?;
    let pipeline = SyncPipeline::new(
        &freshbooks,
        &toggl,
        &config.mapping,
        config.timezone,
        config.created_with.clone(),
    );

    match args.command {
        Command::Entries {
            from,
            to,
            project_id,
        } => {
            let range = date_range(from, to)?;
            print_json(&pipeline.list_entries(range.start(), range.end(), project_id)?)?;
        }
        Command::TogglTasks { toggl_project_id } => {
            print_json(&pipeline.list_destination_tasks(toggl_project_id)?)?;
        }
        Command::Sync {
            from,
            to,
            project_id,
            commit,
            allow_duplicates,
        } => {
            let range = date_range(from, to)?;
            if commit {
                println!("Retrieving and posting time entries for {}", range.label());
            }
            let duplicates = if allow_duplicates {
                DuplicatePolicy::Allow
            } else {
                DuplicatePolicy::SkipExisting
            };
            let report = pipeline.sync(&SyncRequest {
                range,
                source_project_id: project_id,
                commit,
                duplicates,
            })?;
            if !commit {
                print_json(&report.pending)?;
            }
            println!(
                "Fetched {}, mapped {}, skipped {} unmapped and {} existing, submitted {}, failed {}",
                report.fetched,
                report.mapped,
                report.skipped_unmapped,
                report.skipped_existing,
                report.submitted,
                report.failed
            );
            if report.failed > 0 {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Clients => print_json(&freshbooks.list_clients()?)?,
        Command::Projects => print_json(&freshbooks.list_projects()?)?,
        Command::Tasks { project_id } => print_json(&freshbooks.list_tasks(project_id)?)?,
        Command::Workspaces => print_json(&toggl.list_workspaces()?)?,
        Command::WorkspaceProjects { workspace_id } => {
            print_json(&toggl.list_workspace_projects(workspace_id)?)?;
        }
        Command::Hours { from, to } => {
            let range = date_range(from, to)?;
            let (start, end) = range.as_rfc3339(&config.timezone);
            let hours = toggl.sum_tracked_hours(&start, &end)?;
            println!("{}: {hours:.2}h", range.label());
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn date_range(from: chrono::NaiveDate, to: chrono::NaiveDate) -> Result<DateRange> {
    DateRange::from_bounds(from, to).map_err(Error::Usage)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|err| Error::Output(err.to_string()))?;
    println!("{json}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn reversed_dates_are_a_usage_error() {
        let from = NaiveDate::from_ymd_opt(2014, 2, 15).unwrap();
        let to = NaiveDate::from_ymd_opt(2014, 2, 1).unwrap();
        let err = date_range(from, to).unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
        assert!(!err.is_retryable());
    }
}

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::dates::parse_date;

/// Copy FreshBooks time entries into Toggl.
#[derive(Parser, Debug, Clone)]
#[command(name = "fb2toggl", version)]
#[command(about = "Sync FreshBooks time entries into Toggl", long_about = None)]
pub struct Args {
    /// Config file path (defaults to ~/.fb2toggl.json)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print FreshBooks time entries for a project and date range
    Entries {
        /// Start date of the form YYYY-MM-DD
        #[arg(long, value_parser = parse_date)]
        from: NaiveDate,
        /// End date of the form YYYY-MM-DD
        #[arg(long, value_parser = parse_date)]
        to: NaiveDate,
        /// FreshBooks project id
        #[arg(long)]
        project_id: u64,
    },

    /// Print the tasks of a Toggl project
    TogglTasks {
        #[arg(long)]
        toggl_project_id: u64,
    },

    /// Map FreshBooks entries to Toggl; writes only with --commit
    Sync {
        #[arg(long, value_parser = parse_date)]
        from: NaiveDate,
        #[arg(long, value_parser = parse_date)]
        to: NaiveDate,
        #[arg(long)]
        project_id: u64,
        /// Create the entries in Toggl instead of printing them
        #[arg(long)]
        commit: bool,
        /// Do not skip entries that already exist in Toggl
        #[arg(long)]
        allow_duplicates: bool,
    },

    /// Print FreshBooks clients
    Clients,

    /// Print FreshBooks projects
    Projects,

    /// Print FreshBooks tasks, optionally for one project
    Tasks {
        #[arg(long)]
        project_id: Option<u64>,
    },

    /// Print Toggl workspaces
    Workspaces,

    /// Print the projects of a Toggl workspace
    WorkspaceProjects {
        #[arg(long)]
        workspace_id: u64,
    },

    /// Total completed hours tracked in Toggl, running timers excluded
    Hours {
        #[arg(long, value_parser = parse_date)]
        from: NaiveDate,
        #[arg(long, value_parser = parse_date)]
        to: NaiveDate,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_defaults_to_dry_run() {
        let args = Args::parse_from([
            "fb2toggl", "sync", "--from", "2014-02-01", "--to", "2014-02-15", "--project-id", "58",
        ]);
        match args.command {
            Command::Sync {
                from,
                to,
                project_id,
                commit,
                allow_duplicates,
            } => {
                assert_eq!(from, NaiveDate::from_ymd_opt(2014, 2, 1).unwrap());
                assert_eq!(to, NaiveDate::from_ymd_opt(2014, 2, 15).unwrap());
                assert_eq!(project_id, 58);
                assert!(!commit);
                assert!(!allow_duplicates);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(args.config.is_none());
    }

    #[test]
    fn sync_commit_flags() {
        let args = Args::parse_from([
            "fb2toggl",
            "sync",
            "--from",
            "2014-02-01",
            "--to",
            "2014-02-15",
            "--project-id",
            "58",
            "--commit",
            "--allow-duplicates",
        ]);
        assert!(matches!(
            args.command,
            Command::Sync {
                commit: true,
                allow_duplicates: true,
                ..
            }
        ));
    }

    #[test]
    fn config_flag_is_global() {
        let args = Args::parse_from(["fb2toggl", "workspaces", "-c", "/tmp/fb2toggl.json"]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/fb2toggl.json")));
    }

    #[test]
    fn toggl_tasks_requires_project() {
        assert!(Args::try_parse_from(["fb2toggl", "toggl-tasks"]).is_err());
        let args = Args::try_parse_from(["fb2toggl", "toggl-tasks", "--toggl-project-id", "3118555"])
            .unwrap();
        assert!(matches!(
            args.command,
            Command::TogglTasks {
                toggl_project_id: 3118555
            }
        ));
    }

    #[test]
    fn invalid_date_is_rejected() {
        let result = Args::try_parse_from([
            "fb2toggl", "entries", "--from", "02/01/2014", "--to", "2014-02-15", "--project-id", "58",
        ]);
        assert!(result.is_err());
    }
}

use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::mapping::TaskProjectMapping;
use crate::retry::DEFAULT_MAX_RETRIES;

pub const DEFAULT_TOGGL_API_BASE: &str = "https://www.toggl.com/api/v8";
pub const DEFAULT_CREATED_WITH: &str = "Freshbooks to Toggl";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    freshbooks_site_domain: String,
    #[serde(default)]
    freshbooks_api_token: String,
    #[serde(default)]
    freshbooks_endpoint: Option<String>,
    #[serde(default)]
    toggl_api_token: String,
    #[serde(default)]
    toggl_api_base: Option<String>,
    #[serde(default)]
    timezone: String,
    #[serde(default)]
    task_project_mapping: BTreeMap<String, u64>,
    #[serde(default)]
    request_timeout_secs: Option<u64>,
    #[serde(default)]
    max_retries: Option<u32>,
    #[serde(default)]
    created_with: Option<String>,
}

/// Everything both clients and the pipeline need, validated up front.
#[derive(Debug, Clone)]
pub struct Config {
    pub freshbooks_endpoint: String,
    pub freshbooks_api_token: String,
    pub toggl_api_base: String,
    pub toggl_api_token: String,
    pub timezone: Tz,
    pub mapping: TaskProjectMapping,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub created_with: String,
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => default_config_path()
                .ok_or_else(|| Error::Config("Home directory not found".to_string()))?,
        };
        let contents = fs::read_to_string(&path).map_err(|err| {
            Error::Config(format!("Cannot read {}: {err}", path.display()))
        })?;
        let file: ConfigFile = serde_json::from_str(&contents).map_err(|err| {
            Error::Config(format!("Invalid config {}: {err}", path.display()))
        })?;
        Self::from_file(file, |name| env::var(name).ok())
    }

    fn from_file<E>(file: ConfigFile, env_lookup: E) -> Result<Self>
    where
        E: Fn(&str) -> Option<String>,
    {
        let freshbooks_api_token =
            token_override(&env_lookup, "FRESHBOOKS_API_TOKEN", file.freshbooks_api_token);
        let toggl_api_token = token_override(&env_lookup, "TOGGL_API_TOKEN", file.toggl_api_token);

        if freshbooks_api_token.is_empty() {
            return Err(Error::Config("freshbooks_api_token is missing".to_string()));
        }
        if toggl_api_token.is_empty() {
            return Err(Error::Config("toggl_api_token is missing".to_string()));
        }

        let freshbooks_endpoint = match file.freshbooks_endpoint {
            Some(endpoint) if !endpoint.trim().is_empty() => endpoint.trim().to_string(),
            _ => {
                let domain = file.freshbooks_site_domain.trim();
                if domain.is_empty() {
                    return Err(Error::Config("freshbooks_site_domain is missing".to_string()));
                }
                format!("https://{domain}/api/2.1/xml-in")
            }
        };

        let timezone = file
            .timezone
            .trim()
            .parse::<Tz>()
            .map_err(|_| Error::Config(format!("Unknown timezone \"{}\"", file.timezone)))?;

        let mapping = TaskProjectMapping::new(file.task_project_mapping);
        if mapping.is_empty() {
            return Err(Error::Config("task_project_mapping is empty".to_string()));
        }
        log::debug!("Loaded {} task mappings", mapping.len());

        let toggl_api_base = file
            .toggl_api_base
            .map(|base| base.trim().trim_end_matches('/').to_string())
            .filter(|base| !base.is_empty())
            .unwrap_or_else(|| DEFAULT_TOGGL_API_BASE.to_string());

        Ok(Self {
            freshbooks_endpoint,
            freshbooks_api_token,
            toggl_api_base,
            toggl_api_token,
            timezone,
            mapping,
            request_timeout_secs: file.request_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            max_retries: file.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            created_with: file
                .created_with
                .unwrap_or_else(|| DEFAULT_CREATED_WITH.to_string()),
        })
    }
}

fn token_override<E>(env_lookup: &E, name: &str, fallback: String) -> String
where
    E: Fn(&str) -> Option<String>,
{
    if let Some(value) = env_lookup(name) {
        if !value.trim().is_empty() {
            return value.trim().to_string();
        }
    }
    fallback.trim().to_string()
}

pub fn default_config_path() -> Option<PathBuf> {
    let mut path = dirs::home_dir()?;
    path.push(".fb2toggl.json");
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const VALID: &str = r#"{
        "freshbooks_site_domain": "acme.freshbooks.com",
        "freshbooks_api_token": "fb-token",
        "toggl_api_token": "toggl-token",
        "timezone": "America/Los_Angeles",
        "task_project_mapping": {"5": 3118555, "7": 3118555}
    }"#;

    fn from_json(contents: &str) -> Result<Config> {
        let file: ConfigFile = serde_json::from_str(contents)
            .map_err(|err| Error::Config(format!("Invalid config: {err}")))?;
        Config::from_file(file, |_| None)
    }

    #[test]
    fn valid_config_gets_defaults() {
        let config = from_json(VALID).unwrap();
        assert_eq!(
            config.freshbooks_endpoint,
            "https://acme.freshbooks.com/api/2.1/xml-in"
        );
        assert_eq!(config.toggl_api_base, DEFAULT_TOGGL_API_BASE);
        assert_eq!(config.timezone, chrono_tz::America::Los_Angeles);
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(config.created_with, "Freshbooks to Toggl");
        assert_eq!(config.mapping.project_for(5), Some(3118555));
        assert_eq!(config.mapping.project_for(7), Some(3118555));
    }

    #[test]
    fn missing_token_is_config_error() {
        let json = VALID.replace("\"toggl-token\"", "\"\"");
        let err = from_json(&json).unwrap_err();
        assert!(matches!(err, Error::Config(message) if message.contains("toggl_api_token")));
    }

    #[test]
    fn unknown_timezone_is_config_error() {
        let json = VALID.replace("America/Los_Angeles", "Mars/Olympus");
        assert!(matches!(from_json(&json), Err(Error::Config(_))));
    }

    #[test]
    fn empty_mapping_is_config_error() {
        let json = VALID.replace(r#"{"5": 3118555, "7": 3118555}"#, "{}");
        assert!(matches!(from_json(&json), Err(Error::Config(_))));
    }

    #[test]
    fn env_token_overrides_file() {
        let file: ConfigFile = serde_json::from_str(VALID).unwrap();
        let config = Config::from_file(file, |name| {
            (name == "TOGGL_API_TOKEN").then(|| "from-env".to_string())
        })
        .unwrap();
        assert_eq!(config.toggl_api_token, "from-env");
        assert_eq!(config.freshbooks_api_token, "fb-token");
    }

    #[test]
    fn blank_env_token_falls_back_to_file() {
        let file: ConfigFile = serde_json::from_str(VALID).unwrap();
        let config = Config::from_file(file, |_| Some("   ".to_string())).unwrap();
        assert_eq!(config.toggl_api_token, "toggl-token");
    }

    #[test]
    fn endpoint_overrides_trim_slashes() {
        let json = VALID.replace(
            "\"timezone\"",
            "\"toggl_api_base\": \"http://localhost:9000/api/v8/\", \"freshbooks_endpoint\": \"http://localhost:9001/xml-in\", \"timezone\"",
        );
        let config = from_json(&json).unwrap();
        assert_eq!(config.toggl_api_base, "http://localhost:9000/api/v8");
        assert_eq!(config.freshbooks_endpoint, "http://localhost:9001/xml-in");
    }

    #[test]
    fn load_reads_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(VALID.as_bytes()).unwrap();
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.mapping.len(), 2);
    }

    #[test]
    fn load_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        assert!(matches!(Config::load(Some(&path)), Err(Error::Config(_))));
    }
}

//! Application configuration.
//!
//! The sidebar host reads `config.yaml` from the platform config directory
//! (or `--config`). The standalone MCP server is configured entirely from
//! environment variables. Both paths produce the same runtime
//! [`TrackerConfig`] and [`BoardConfig`] values.

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{LookoutError, Result};
use crate::types::{GroupKey, parse_group_keys};

pub const DEFAULT_SENTRY_URL: &str = "https://sentry.io";
pub const DEFAULT_CLICKUP_URL: &str = "https://api.clickup.com/api/v2";
pub const DEFAULT_LOCALE: &str = "en";

pub const ENV_SENTRY_URL: &str = "SENTRY_URL";
pub const ENV_SENTRY_AUTH_TOKEN: &str = "SENTRY_AUTH_TOKEN";
pub const ENV_SENTRY_PROJECTS: &str = "SENTRY_PROJECTS";
pub const ENV_CLICKUP_API_TOKEN: &str = "CLICKUP_API_TOKEN";
pub const ENV_CLICKUP_TEAM_ID: &str = "CLICKUP_TEAM_ID";
pub const ENV_CLICKUP_CUSTOM_FIELDS: &str = "CLICKUP_CUSTOM_FIELDS";
pub const ENV_CLICKUP_LIST_ID: &str = "CLICKUP_LIST_ID";
pub const ENV_CLICKUP_DONE_STATUS: &str = "CLICKUP_DONE_STATUS";
pub const ENV_CLICKUP_LOCALE: &str = "CLICKUP_LOCALE";

/// On-disk configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracker: Option<TrackerSection>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board: Option<BoardSection>,

    /// Seconds between background issue refreshes (default: 300)
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,

    /// Per-request timeout in seconds (default: 10)
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

fn default_refresh_interval() -> u64 {
    300
}

fn default_request_timeout() -> u64 {
    10
}

fn default_sentry_url() -> String {
    DEFAULT_SENTRY_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tracker: None,
            board: None,
            refresh_interval: default_refresh_interval(),
            request_timeout: default_request_timeout(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TrackerSection {
    #[serde(default = "default_sentry_url")]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// `org/project` identifiers, in display order
    #[serde(default)]
    pub projects: Vec<String>,
}

impl fmt::Debug for TrackerSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerSection")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("projects", &self.projects)
            .finish()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct BoardSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_fields: Vec<CustomField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl fmt::Debug for BoardSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoardSection")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("team_id", &self.team_id)
            .field("list_id", &self.list_id)
            .field("done_status", &self.done_status)
            .field("locale", &self.locale)
            .field("custom_fields", &self.custom_fields)
            .field("url", &self.url)
            .finish()
    }
}

/// A custom field value attached to every created task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomField {
    pub id: String,
    pub value: serde_json::Value,
}

/// Runtime tracker settings. Without these nothing else runs.
#[derive(Clone)]
pub struct TrackerConfig {
    pub url: String,
    pub token: SecretString,
    pub groups: Vec<GroupKey>,
    pub timeout: Duration,
}

impl fmt::Debug for TrackerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerConfig")
            .field("url", &self.url)
            .field("token", &"[REDACTED]")
            .field("groups", &self.groups)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Runtime board settings. Absent means task features are disabled.
#[derive(Clone)]
pub struct BoardConfig {
    pub url: String,
    pub token: SecretString,
    pub team_id: String,
    pub list_id: Option<String>,
    pub done_status: Option<String>,
    pub locale: String,
    pub custom_fields: Vec<CustomField>,
    pub timeout: Duration,
}

impl fmt::Debug for BoardConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoardConfig")
            .field("url", &self.url)
            .field("token", &"[REDACTED]")
            .field("team_id", &self.team_id)
            .field("list_id", &self.list_id)
            .field("done_status", &self.done_status)
            .field("locale", &self.locale)
            .field("custom_fields", &self.custom_fields)
            .finish()
    }
}

impl PartialEq for BoardConfig {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
            && self.token.expose_secret() == other.token.expose_secret()
            && self.team_id == other.team_id
            && self.list_id == other.list_id
            && self.done_status == other.done_status
            && self.locale == other.locale
            && self.custom_fields == other.custom_fields
            && self.timeout == other.timeout
    }
}

impl BoardConfig {
    /// Minimal board config, mostly useful in tests.
    pub fn new(url: impl Into<String>, token: &str, team_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: SecretString::from(token.to_string()),
            team_id: team_id.into(),
            list_id: None,
            done_status: None,
            locale: DEFAULT_LOCALE.to_string(),
            custom_fields: Vec::new(),
            timeout: Duration::from_secs(default_request_timeout()),
        }
    }
}

impl Config {
    /// Default config file location: `<config dir>/lookout/config.yaml`.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "lookout")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Load from `path`, or the default location. A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) => p,
                None => return Ok(Config::default()),
            },
        };
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&path).map_err(|e| {
            LookoutError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read config at {}: {}", path.display(), e),
            ))
        })?;
        let config: Config = serde_yaml_ng::from_str(&content)?;
        Ok(config)
    }

    /// Save to `path`, creating parent directories. Owner-only on unix.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_yaml_ng::to_string(self)?;
        fs::write(path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout.max(1))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval.max(10))
    }

    /// Sentry token from environment or config file, environment first.
    pub fn sentry_token(&self) -> Option<String> {
        env_non_empty(ENV_SENTRY_AUTH_TOKEN).or_else(|| {
            self.tracker
                .as_ref()
                .and_then(|t| t.token.clone())
                .filter(|t| !t.is_empty())
        })
    }

    /// ClickUp token from environment or config file, environment first.
    pub fn clickup_token(&self) -> Option<String> {
        env_non_empty(ENV_CLICKUP_API_TOKEN).or_else(|| {
            self.board
                .as_ref()
                .and_then(|b| b.token.clone())
                .filter(|t| !t.is_empty())
        })
    }

    /// Runtime tracker config, or `None` when token or projects are missing.
    ///
    /// Malformed project identifiers are skipped with a warning.
    pub fn tracker_config(&self) -> Option<TrackerConfig> {
        let section = self.tracker.as_ref()?;
        let token = self.sentry_token()?;

        let mut groups = Vec::new();
        for raw in &section.projects {
            match raw.parse::<GroupKey>() {
                Ok(key) if groups.contains(&key) => {
                    debug!(project = %key, "skipping repeated tracker project");
                }
                Ok(key) => groups.push(key),
                Err(e) => warn!("ignoring tracker project: {e}"),
            }
        }
        if groups.is_empty() {
            return None;
        }

        Some(TrackerConfig {
            url: trim_url(&section.url),
            token: SecretString::from(token),
            groups,
            timeout: self.request_timeout(),
        })
    }

    /// Runtime board config, or `None` when token or team id are missing.
    pub fn board_config(&self) -> Option<BoardConfig> {
        let section = self.board.clone().unwrap_or_default();
        let token = self.clickup_token()?;
        let team_id = section.team_id.filter(|t| !t.is_empty())?;

        Some(BoardConfig {
            url: section
                .url
                .as_deref()
                .map(trim_url)
                .unwrap_or_else(|| DEFAULT_CLICKUP_URL.to_string()),
            token: SecretString::from(token),
            team_id,
            list_id: section.list_id.filter(|s| !s.is_empty()),
            done_status: section.done_status.filter(|s| !s.is_empty()),
            locale: section
                .locale
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_LOCALE.to_string()),
            custom_fields: section.custom_fields,
            timeout: self.request_timeout(),
        })
    }
}

/// Tracker config for the standalone MCP server.
///
/// `SENTRY_URL`, `SENTRY_AUTH_TOKEN` and `SENTRY_PROJECTS` are all required;
/// the error names every missing variable.
pub fn tracker_config_from_env() -> Result<TrackerConfig> {
    let url = env_non_empty(ENV_SENTRY_URL);
    let token = env_non_empty(ENV_SENTRY_AUTH_TOKEN);
    let projects = env_non_empty(ENV_SENTRY_PROJECTS);

    let (url, token, projects) = match (url, token, projects) {
        (Some(u), Some(t), Some(p)) => (u, t, p),
        (u, t, p) => {
            let missing: Vec<&str> = [
                (ENV_SENTRY_URL, u.is_none()),
                (ENV_SENTRY_AUTH_TOKEN, t.is_none()),
                (ENV_SENTRY_PROJECTS, p.is_none()),
            ]
            .into_iter()
            .filter(|(_, absent)| *absent)
            .map(|(name, _)| name)
            .collect();
            return Err(LookoutError::Config(format!(
                "missing required environment variable(s): {}",
                missing.join(", ")
            )));
        }
    };

    let groups = parse_group_keys(&projects)?;
    if groups.is_empty() {
        return Err(LookoutError::Config(format!(
            "{ENV_SENTRY_PROJECTS} must list at least one 'org/project'"
        )));
    }

    Ok(TrackerConfig {
        url: trim_url(&url),
        token: SecretString::from(token),
        groups,
        timeout: Duration::from_secs(default_request_timeout()),
    })
}

/// Board config for the standalone MCP server.
///
/// Returns `None` unless both `CLICKUP_API_TOKEN` and `CLICKUP_TEAM_ID` are
/// set. Malformed custom fields disable the board with a warning.
pub fn board_config_from_env() -> Option<BoardConfig> {
    let token = env_non_empty(ENV_CLICKUP_API_TOKEN)?;
    let team_id = env_non_empty(ENV_CLICKUP_TEAM_ID)?;

    let custom_fields = match env_non_empty(ENV_CLICKUP_CUSTOM_FIELDS) {
        Some(raw) => match parse_custom_fields(&raw) {
            Ok(fields) => fields,
            Err(e) => {
                warn!("board integration disabled: {e}");
                return None;
            }
        },
        None => Vec::new(),
    };

    Some(BoardConfig {
        url: DEFAULT_CLICKUP_URL.to_string(),
        token: SecretString::from(token),
        team_id,
        list_id: env_non_empty(ENV_CLICKUP_LIST_ID),
        done_status: env_non_empty(ENV_CLICKUP_DONE_STATUS),
        locale: env_non_empty(ENV_CLICKUP_LOCALE).unwrap_or_else(|| DEFAULT_LOCALE.to_string()),
        custom_fields,
        timeout: Duration::from_secs(default_request_timeout()),
    })
}

/// Parse `{"id":..,"value":..},{"id":..,"value":..}` into custom fields.
pub fn parse_custom_fields(raw: &str) -> Result<Vec<CustomField>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    let wrapped = if raw.starts_with('[') {
        raw.to_string()
    } else {
        format!("[{raw}]")
    };
    serde_json::from_str(&wrapped).map_err(|e| {
        LookoutError::Config(format!("invalid {ENV_CLICKUP_CUSTOM_FIELDS}: {e}"))
    })
}

fn env_non_empty(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => None,
    }
}

fn trim_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

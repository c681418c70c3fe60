//! `config show`: display the effective configuration.
//!
//! Tokens are never printed in full. The report reflects what the sidebar
//! would actually run with, so environment token overrides are applied.

use std::env;
use std::path::{Path, PathBuf};

use owo_colors::OwoColorize;
use serde_json::{Value, json};

use super::print_json;
use crate::config::{Config, ENV_CLICKUP_API_TOKEN, ENV_SENTRY_AUTH_TOKEN};
use crate::error::Result;

/// Mask a sensitive value by showing only the first 2 and last 2 characters.
fn mask_sensitive_value(value: &str) -> String {
    let char_count = value.chars().count();
    if char_count > 4 {
        let first: String = value.chars().take(2).collect();
        let last: String = value.chars().skip(char_count - 2).collect();
        format!("{first}...{last}")
    } else {
        "****".to_string()
    }
}

fn token_source(env_key: &str) -> &'static str {
    match env::var(env_key) {
        Ok(v) if !v.trim().is_empty() => "environment",
        _ => "file",
    }
}

fn token_report(token: Option<String>, env_key: &str) -> Value {
    match token {
        Some(t) => json!({
            "configured": true,
            "value": mask_sensitive_value(&t),
            "source": token_source(env_key),
        }),
        None => json!({ "configured": false }),
    }
}

/// Effective configuration as JSON, with tokens masked.
pub(crate) fn config_report(config: &Config, path: Option<&Path>) -> Value {
    let tracker = config.tracker.as_ref();
    let board = config.board.clone().unwrap_or_default();

    json!({
        "config_file": path.map(|p| p.to_string_lossy().into_owned()),
        "tracker": {
            "url": tracker.map(|t| t.url.clone()),
            "projects": tracker.map(|t| t.projects.clone()).unwrap_or_default(),
            "token": token_report(config.sentry_token(), ENV_SENTRY_AUTH_TOKEN),
            "ready": config.tracker_config().is_some(),
        },
        "board": {
            "team_id": board.team_id,
            "list_id": board.list_id,
            "done_status": board.done_status,
            "locale": board.locale,
            "custom_fields": board.custom_fields.len(),
            "token": token_report(config.clickup_token(), ENV_CLICKUP_API_TOKEN),
            "ready": config.board_config().is_some(),
        },
        "refresh_interval": config.refresh_interval,
        "request_timeout": config.request_timeout,
    })
}

fn status(ready: bool) -> String {
    if ready {
        "configured".green().to_string()
    } else {
        "not configured".dimmed().to_string()
    }
}

fn field(value: &Value) -> String {
    match value {
        Value::Null => "-".dimmed().to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn token_line(token: &Value) -> String {
    if token["configured"].as_bool().unwrap_or(false) {
        format!("{} ({})", field(&token["value"]), field(&token["source"]))
    } else {
        "not set".dimmed().to_string()
    }
}

fn render_text(report: &Value) -> String {
    let tracker = &report["tracker"];
    let board = &report["board"];
    let mut out = format!("{}\n\n", "Configuration:".cyan().bold());

    out.push_str(&format!("{}: {}\n", "file".cyan(), field(&report["config_file"])));
    out.push('\n');

    out.push_str(&format!(
        "{}: {}\n",
        "tracker".cyan(),
        status(tracker["ready"].as_bool().unwrap_or(false))
    ));
    out.push_str(&format!("  url: {}\n", field(&tracker["url"])));
    let projects: Vec<&str> = tracker["projects"]
        .as_array()
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    out.push_str(&format!("  projects: {}\n", projects.join(", ")));
    out.push_str(&format!("  token: {}\n", token_line(&tracker["token"])));
    out.push('\n');

    out.push_str(&format!(
        "{}: {}\n",
        "board".cyan(),
        status(board["ready"].as_bool().unwrap_or(false))
    ));
    for key in ["team_id", "list_id", "done_status", "locale", "custom_fields"] {
        out.push_str(&format!("  {key}: {}\n", field(&board[key])));
    }
    out.push_str(&format!("  token: {}\n", token_line(&board["token"])));
    out.push('\n');

    out.push_str(&format!(
        "refresh_interval: {}s\nrequest_timeout: {}s\n",
        report["refresh_interval"], report["request_timeout"]
    ));
    out
}

/// Show current configuration
pub fn cmd_config_show(path: Option<&Path>, output_json: bool) -> Result<()> {
    let config = Config::load(path)?;
    let resolved: Option<PathBuf> = path.map(Path::to_path_buf).or_else(Config::default_path);
    let report = config_report(&config, resolved.as_deref());

    if output_json {
        print_json(&report)?;
    } else {
        print!("{}", render_text(&report));
    }
    Ok(())
}

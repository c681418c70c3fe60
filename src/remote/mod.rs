//! Upstream clients: the issue tracker (Sentry) and the task board (ClickUp).
//!
//! The rest of the crate only sees the [`IssueClient`] and [`TaskClient`]
//! traits. Concrete HTTP clients are built through a [`ClientFactory`] so the
//! store and the tool server can be exercised against in-memory fakes.

pub mod clickup;
pub mod error;
#[cfg(test)]
pub(crate) mod fakes;
pub mod retry;
pub mod richtext;
pub mod sentry;
pub mod status;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::HeaderValue;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::{BoardConfig, CustomField, TrackerConfig};
use crate::error::{LookoutError, Result};
use crate::types::{Comment, GroupKey, Issue, IssueEvent, TaskList};

pub use clickup::ClickUpClient;
pub use richtext::CommentSegment;
pub use sentry::SentryClient;

/// Tag put on every task created from an issue.
pub const TASK_MARKER_TAG: &str = "sentry";

/// Read and mutate tracker issues.
#[async_trait]
pub trait IssueClient: Send + Sync {
    /// Unresolved issues of one project, most recent first.
    async fn list_issues(&self, group: &GroupKey) -> Result<Vec<Issue>>;

    async fn latest_event(&self, issue_id: &str) -> Result<IssueEvent>;

    async fn list_comments(&self, issue_id: &str) -> Result<Vec<Comment>>;

    async fn post_comment(&self, issue_id: &str, text: &str) -> Result<()>;

    /// Mark the issue resolved in the next release.
    async fn resolve_issue(&self, issue_id: &str) -> Result<()>;
}

/// Task to create on the board.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub custom_fields: Vec<CustomField>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedTask {
    pub id: String,
    pub url: String,
}

/// A task as fetched, with whatever status vocabulary came along with it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDetails {
    pub id: String,
    pub name: String,
    pub url: Option<String>,
    pub status: Option<String>,
    pub list_id: Option<String>,
    /// Statuses embedded in the task's list info
    pub list_statuses: Option<Vec<String>>,
    /// Statuses attached to the task itself
    pub task_statuses: Option<Vec<String>>,
}

/// Read and mutate board tasks.
#[async_trait]
pub trait TaskClient: Send + Sync {
    /// Every list of the team, flattened space → folder → folderless.
    async fn list_task_lists(&self) -> Result<Vec<TaskList>>;

    async fn create_task(&self, list_id: &str, task: &NewTask) -> Result<CreatedTask>;

    async fn post_comment(&self, task: &TaskId, segments: &[CommentSegment]) -> Result<()>;

    async fn get_task(&self, task: &TaskId) -> Result<TaskDetails>;

    async fn list_statuses(&self, list_id: &str) -> Result<Vec<String>>;

    async fn update_status(&self, task: &TaskId, status: &str) -> Result<()>;
}

/// Builds clients from runtime configuration.
pub trait ClientFactory: Send + Sync {
    fn issue_client(&self, config: &TrackerConfig) -> Result<Arc<dyn IssueClient>>;
    fn task_client(&self, config: &BoardConfig) -> Result<Arc<dyn TaskClient>>;
}

/// Factory producing the reqwest-backed clients.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpClientFactory;

impl ClientFactory for HttpClientFactory {
    fn issue_client(&self, config: &TrackerConfig) -> Result<Arc<dyn IssueClient>> {
        Ok(Arc::new(SentryClient::new(config)?))
    }

    fn task_client(&self, config: &BoardConfig) -> Result<Arc<dyn TaskClient>> {
        Ok(Arc::new(ClickUpClient::new(config)?))
    }
}

/// A task as addressed by a caller.
///
/// Custom task ids (`ABC-12`) only resolve together with their workspace,
/// which task URLs of the form `/t/<team>/<custom-id>` carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskId {
    pub id: String,
    /// Workspace of a custom task id
    pub custom_team: Option<String>,
}

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            custom_team: None,
        }
    }

    pub fn custom(id: impl Into<String>, team: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            custom_team: Some(team.into()),
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Extract a task id from a raw id or a task URL (last path segment).
pub fn parse_task_id(input: &str) -> Result<TaskId> {
    let input = input.trim();
    if input.is_empty() {
        return Err(LookoutError::Validation("task id cannot be empty".to_string()));
    }
    if !input.contains("://") {
        return Ok(TaskId::new(input));
    }

    let url = url::Url::parse(input)
        .map_err(|e| LookoutError::Validation(format!("invalid task URL '{input}': {e}")))?;
    let segments: Vec<&str> = url
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();
    match segments.as_slice() {
        [.., "t", team, id] => Ok(TaskId::custom(*id, *team)),
        [.., id] => Ok(TaskId::new(*id)),
        [] => Err(LookoutError::Validation(format!(
            "task URL '{input}' has no task id"
        ))),
    }
}

/// Authorization header value that never prints its content.
///
/// Marked sensitive so reqwest's own debug output redacts it as well.
pub(crate) struct RedactedHeader {
    value: SecretString,
}

impl RedactedHeader {
    pub(crate) fn new(value: &SecretString) -> Self {
        Self {
            value: value.clone(),
        }
    }

    pub(crate) fn as_header_value(&self) -> Result<HeaderValue> {
        let mut header = HeaderValue::from_str(self.value.expose_secret()).map_err(|_| {
            LookoutError::Config("API token contains characters not allowed in a header".into())
        })?;
        header.set_sensitive(true);
        Ok(header)
    }
}

impl fmt::Display for RedactedHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl fmt::Debug for RedactedHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedactedHeader")
            .field("value", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_task_id_raw() {
        assert_eq!(parse_task_id(" abc123 ").unwrap(), TaskId::new("abc123"));
    }

    #[test]
    fn test_parse_task_id_url() {
        assert_eq!(
            parse_task_id("https://app.clickup.com/t/abc123").unwrap(),
            TaskId::new("abc123")
        );
    }

    #[test]
    fn test_parse_custom_task_id_keeps_team() {
        let task = parse_task_id("https://app.clickup.com/t/9012/ABC-12/").unwrap();
        assert_eq!(task, TaskId::custom("ABC-12", "9012"));
        assert_eq!(task.to_string(), "ABC-12");
    }

    #[test]
    fn test_parse_task_id_rejects_empty() {
        assert!(parse_task_id("   ").is_err());
        assert!(parse_task_id("https://app.clickup.com/").is_err());
    }

    #[test]
    fn test_redacted_header() {
        let token = SecretString::from("pk_secret".to_string());
        let header = RedactedHeader::new(&token);
        assert_eq!(header.to_string(), "[REDACTED]");
        assert!(!format!("{header:?}").contains("pk_secret"));
        let value = header.as_header_value().unwrap();
        assert!(value.is_sensitive());
        assert_eq!(value.to_str().unwrap(), "pk_secret");

        let bad = SecretString::from("bad\nvalue".to_string());
        assert!(RedactedHeader::new(&bad).as_header_value().is_err());
    }
}

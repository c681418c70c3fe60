//! MCP tool request types and input validation.
//!
//! Each tool's argument object is one of these structs; the JSON schema
//! advertised in `tools/list` is generated from them.

use rmcp::schemars::{self, JsonSchema};
use serde::{Deserialize, Serialize};

use crate::types::GroupKey;
use crate::utils::validation::{
    DEFAULT_SEARCH_LIMIT, validate_comment, validate_identifier, validate_limit,
};

/// Request parameters for searching issues
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct SearchIssuesRequest {
    #[schemars(
        description = "Case-insensitive text matched against issue title, short id and culprit"
    )]
    pub query: Option<String>,

    #[schemars(description = "Only search this project, as \"org/project\"")]
    pub project: Option<String>,

    #[schemars(description = "Maximum number of issues to return (1-100, default 25)")]
    pub limit: Option<u32>,
}

impl SearchIssuesRequest {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if let Some(limit) = self.limit {
            validate_limit(limit)?;
        }
        if let Some(project) = self.project.as_deref().filter(|p| !p.trim().is_empty()) {
            project
                .trim()
                .parse::<GroupKey>()
                .map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    pub(crate) fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_SEARCH_LIMIT) as usize
    }

    /// Lowercased search needle; empty matches everything.
    pub(crate) fn needle(&self) -> String {
        self.query
            .as_deref()
            .map(|q| q.trim().to_lowercase())
            .unwrap_or_default()
    }

    pub(crate) fn project(&self) -> Option<GroupKey> {
        self.project
            .as_deref()
            .and_then(|p| p.trim().parse().ok())
    }
}

/// Request parameters for issue details
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct GetIssueDetailsRequest {
    #[schemars(description = "Issue id or short id (e.g. \"WEB-1A\")")]
    pub issue_id: String,
}

impl GetIssueDetailsRequest {
    pub(crate) fn validate(&self) -> Result<(), String> {
        validate_identifier(&self.issue_id, "issue_id")
    }
}

/// `list_projects` takes no arguments.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct ListProjectsRequest {}

/// Request parameters for resolving an issue
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ResolveIssueRequest {
    #[schemars(description = "Issue id or short id to mark resolved in the next release")]
    pub issue_id: String,
}

impl ResolveIssueRequest {
    pub(crate) fn validate(&self) -> Result<(), String> {
        validate_identifier(&self.issue_id, "issue_id")
    }
}

/// Request parameters for commenting on a task
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct AddTaskCommentRequest {
    #[schemars(
        description = "Task id or task URL (e.g. \"abc123\" or \"https://app.clickup.com/t/abc123\")"
    )]
    pub task_id: String,

    #[schemars(
        description = "Comment text in markdown (bold, italic, inline code supported; max 10000 chars)"
    )]
    pub comment: String,
}

impl AddTaskCommentRequest {
    pub(crate) fn validate(&self) -> Result<(), String> {
        validate_identifier(&self.task_id, "task_id")?;
        validate_comment(&self.comment)
    }
}

/// Request parameters for changing a task's status
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct SetTaskStatusRequest {
    #[schemars(description = "Task id or task URL")]
    pub task_id: String,

    #[schemars(
        description = "Status name as shown on the board (matched case-insensitively, e.g. \"in progress\")"
    )]
    pub status: String,
}

impl SetTaskStatusRequest {
    pub(crate) fn validate(&self) -> Result<(), String> {
        validate_identifier(&self.task_id, "task_id")?;
        validate_identifier(&self.status, "status")
    }
}

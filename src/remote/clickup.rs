//! ClickUp REST client (API v2).

use async_trait::async_trait;
use reqwest::header::{self, HeaderValue};
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::BoardConfig;
use crate::error::Result;
use crate::types::TaskList;

use super::error::ApiError;
use super::retry::{RetryPolicy, execute_with_retry};
use super::{
    CommentSegment, CreatedTask, NewTask, RedactedHeader, TaskClient, TaskDetails, TaskId,
};

const PROVIDER: &str = "ClickUp";
const ARCHIVED: [(&str, &str); 1] = [("archived", "false")];

pub struct ClickUpClient {
    client: Client,
    base_url: String,
    team_id: String,
    auth: HeaderValue,
    retry: RetryPolicy,
}

impl ClickUpClient {
    pub fn new(config: &BoardConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .user_agent(concat!("lookout/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let auth = RedactedHeader::new(&config.token).as_header_value()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            team_id: config.team_id.clone(),
            auth,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> std::result::Result<Response, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, path, "clickup request");
        execute_with_retry(&self.retry, || {
            let request = self
                .client
                .request(method.clone(), &url)
                .header(header::AUTHORIZATION, self.auth.clone())
                .query(query);
            let request = match body {
                Some(body) => request.json(body),
                None => request,
            };
            async move {
                let response = request
                    .send()
                    .await
                    .map_err(|e| ApiError::from_reqwest(e, PROVIDER))?;
                if !response.status().is_success() {
                    return Err(ApiError::from_response(response, PROVIDER).await);
                }
                Ok(response)
            }
        })
        .await
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> std::result::Result<T, ApiError> {
        let response = self.send(method, path, query, body).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::new(format!("unexpected response body: {e}"), PROVIDER))
    }

    async fn lists_at(&self, path: &str) -> std::result::Result<Vec<RawNamed>, ApiError> {
        let raw: RawLists = self.fetch(Method::GET, path, &ARCHIVED, None).await?;
        Ok(raw.lists)
    }
}

#[async_trait]
impl TaskClient for ClickUpClient {
    async fn list_task_lists(&self) -> Result<Vec<TaskList>> {
        let spaces: RawSpaces = self
            .fetch(
                Method::GET,
                &format!("/team/{}/space", self.team_id),
                &ARCHIVED,
                None,
            )
            .await
            .map_err(|e| e.not_found_as(|| format!("team '{}' not found", self.team_id)))?;

        let mut result = Vec::new();
        for space in spaces.spaces {
            match self
                .fetch::<RawFolders>(
                    Method::GET,
                    &format!("/space/{}/folder", space.id),
                    &ARCHIVED,
                    None,
                )
                .await
            {
                Ok(folders) => {
                    for folder in folders.folders {
                        match self.lists_at(&format!("/folder/{}/list", folder.id)).await {
                            Ok(lists) => result.extend(lists.into_iter().map(|l| TaskList {
                                id: l.id,
                                name: l.name,
                                space: space.name.clone(),
                                folder: Some(folder.name.clone()),
                            })),
                            Err(e) => warn!(folder = %folder.name, "skipping folder lists: {e}"),
                        }
                    }
                }
                Err(e) => warn!(space = %space.name, "skipping space folders: {e}"),
            }

            match self.lists_at(&format!("/space/{}/list", space.id)).await {
                Ok(lists) => result.extend(lists.into_iter().map(|l| TaskList {
                    id: l.id,
                    name: l.name,
                    space: space.name.clone(),
                    folder: None,
                })),
                Err(e) => warn!(space = %space.name, "skipping folderless lists: {e}"),
            }
        }
        Ok(result)
    }

    async fn create_task(&self, list_id: &str, task: &NewTask) -> Result<CreatedTask> {
        let mut body = json!({
            "name": task.name,
            "markdown_description": task.description,
            "tags": task.tags,
        });
        if !task.custom_fields.is_empty() {
            body["custom_fields"] = serde_json::to_value(&task.custom_fields)?;
        }

        let created: RawCreated = self
            .fetch(
                Method::POST,
                &format!("/list/{list_id}/task"),
                &[],
                Some(&body),
            )
            .await
            .map_err(|e| e.not_found_as(|| format!("task list '{list_id}' not found")))?;
        let url = created
            .url
            .unwrap_or_else(|| format!("https://app.clickup.com/t/{}", created.id));
        Ok(CreatedTask {
            id: created.id,
            url,
        })
    }

    async fn post_comment(&self, task: &TaskId, segments: &[CommentSegment]) -> Result<()> {
        let body = json!({
            "comment": segments,
            "notify_all": false,
        });
        self.send(
            Method::POST,
            &format!("/task/{}/comment", task.id),
            &task_query(task),
            Some(&body),
        )
        .await
        .map_err(|e| e.not_found_as(|| format!("task '{task}' not found")))?;
        Ok(())
    }

    async fn get_task(&self, task: &TaskId) -> Result<TaskDetails> {
        let raw: RawTask = self
            .fetch(
                Method::GET,
                &format!("/task/{}", task.id),
                &task_query(task),
                None,
            )
            .await
            .map_err(|e| e.not_found_as(|| format!("task '{task}' not found")))?;
        Ok(raw.into_details())
    }

    async fn list_statuses(&self, list_id: &str) -> Result<Vec<String>> {
        let raw: RawList = self
            .fetch(Method::GET, &format!("/list/{list_id}"), &[], None)
            .await
            .map_err(|e| e.not_found_as(|| format!("task list '{list_id}' not found")))?;
        Ok(status_names(raw.statuses.unwrap_or_default()))
    }

    async fn update_status(&self, task: &TaskId, status: &str) -> Result<()> {
        let body = json!({ "status": status });
        self.send(
            Method::PUT,
            &format!("/task/{}", task.id),
            &task_query(task),
            Some(&body),
        )
        .await
        .map_err(|e| e.not_found_as(|| format!("task '{task}' not found")))?;
        Ok(())
    }
}

/// Custom task ids must be flagged and scoped to their workspace.
fn task_query(task: &TaskId) -> Vec<(&'static str, &str)> {
    match &task.custom_team {
        Some(team) => vec![("custom_task_ids", "true"), ("team_id", team.as_str())],
        None => Vec::new(),
    }
}

// Wire types

/// ClickUp sends ids as strings on most endpoints and numbers on a few.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct RawNamed {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawSpaces {
    #[serde(default)]
    spaces: Vec<RawNamed>,
}

#[derive(Debug, Deserialize)]
struct RawFolders {
    #[serde(default)]
    folders: Vec<RawNamed>,
}

#[derive(Debug, Deserialize)]
struct RawLists {
    #[serde(default)]
    lists: Vec<RawNamed>,
}

#[derive(Debug, Deserialize)]
struct RawCreated {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawStatus {
    status: String,
}

#[derive(Debug, Deserialize)]
struct RawTaskList {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    #[serde(default)]
    statuses: Option<Vec<RawStatus>>,
}

#[derive(Debug, Deserialize)]
struct RawTask {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    status: Option<RawStatus>,
    #[serde(default)]
    list: Option<RawTaskList>,
    #[serde(default)]
    statuses: Option<Vec<RawStatus>>,
}

impl RawTask {
    fn into_details(self) -> TaskDetails {
        let (list_id, list_statuses) = match self.list {
            Some(list) => (Some(list.id), list.statuses.map(status_names)),
            None => (None, None),
        };
        TaskDetails {
            id: self.id,
            name: self.name,
            url: self.url,
            status: self.status.map(|s| s.status),
            list_id,
            list_statuses,
            task_statuses: self.statuses.map(status_names),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawList {
    #[serde(default)]
    statuses: Option<Vec<RawStatus>>,
}

fn status_names(statuses: Vec<RawStatus>) -> Vec<String> {
    statuses.into_iter().map(|s| s.status).collect()
}

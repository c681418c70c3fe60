//! Sentry REST client.

use async_trait::async_trait;
use jiff::Timestamp;
use reqwest::header::{self, HeaderValue};
use reqwest::{Client, Method, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::TrackerConfig;
use crate::error::Result;
use crate::types::{
    Breadcrumb, Comment, EventTag, ExceptionInfo, GroupKey, Issue, IssueEvent, StackFrame,
};

use super::error::ApiError;
use super::retry::{RetryPolicy, execute_with_retry};
use super::{IssueClient, RedactedHeader};

const PROVIDER: &str = "Sentry";

pub struct SentryClient {
    client: Client,
    base_url: String,
    auth: HeaderValue,
    retry: RetryPolicy,
}

impl SentryClient {
    pub fn new(config: &TrackerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .user_agent(concat!("lookout/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let bearer = SecretString::from(format!("Bearer {}", config.token.expose_secret()));
        let auth = RedactedHeader::new(&bearer).as_header_value()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
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
        debug!(%method, path, "sentry request");
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

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> std::result::Result<T, ApiError> {
        let response = self.send(Method::GET, path, query, None).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::new(format!("unexpected response body: {e}"), PROVIDER))
    }
}

#[async_trait]
impl IssueClient for SentryClient {
    async fn list_issues(&self, group: &GroupKey) -> Result<Vec<Issue>> {
        let path = format!("/api/0/projects/{}/{}/issues/", group.org, group.project);
        let query = [
            ("query", "is:unresolved"),
            ("sort", "date"),
            ("limit", "100"),
            ("statsPeriod", "14d"),
        ];
        let raw: Vec<SentryIssue> = self
            .get_json(&path, &query)
            .await
            .map_err(|e| e.not_found_as(|| format!("project '{group}' not found")))?;
        Ok(raw.into_iter().map(|i| i.into_issue(group)).collect())
    }

    async fn latest_event(&self, issue_id: &str) -> Result<IssueEvent> {
        let path = format!("/api/0/issues/{issue_id}/events/latest/");
        let raw: SentryEvent = self
            .get_json(&path, &[])
            .await
            .map_err(|e| e.not_found_as(|| format!("no events found for issue '{issue_id}'")))?;
        Ok(raw.into_event())
    }

    async fn list_comments(&self, issue_id: &str) -> Result<Vec<Comment>> {
        let path = format!("/api/0/issues/{issue_id}/comments/");
        let raw: Vec<SentryComment> = self
            .get_json(&path, &[])
            .await
            .map_err(|e| e.not_found_as(|| format!("issue '{issue_id}' not found")))?;
        Ok(raw
            .into_iter()
            .filter_map(|c| {
                let text = c.data.text?;
                Some(Comment {
                    id: c.id,
                    text,
                    created_at: c.date_created,
                })
            })
            .collect())
    }

    async fn post_comment(&self, issue_id: &str, text: &str) -> Result<()> {
        let path = format!("/api/0/issues/{issue_id}/comments/");
        let body = json!({ "text": text });
        self.send(Method::POST, &path, &[], Some(&body))
            .await
            .map_err(|e| e.not_found_as(|| format!("issue '{issue_id}' not found")))?;
        Ok(())
    }

    async fn resolve_issue(&self, issue_id: &str) -> Result<()> {
        let path = format!("/api/0/issues/{issue_id}/");
        let body = json!({
            "status": "resolved",
            "statusDetails": { "inNextRelease": true },
        });
        self.send(Method::PUT, &path, &[], Some(&body))
            .await
            .map_err(|e| e.not_found_as(|| format!("issue '{issue_id}' not found")))?;
        Ok(())
    }
}

// Wire types

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SentryIssue {
    id: String,
    #[serde(default)]
    short_id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    culprit: Option<String>,
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    count: Value,
    #[serde(default)]
    user_count: Value,
    #[serde(default)]
    first_seen: Option<Timestamp>,
    #[serde(default)]
    last_seen: Option<Timestamp>,
    #[serde(default)]
    permalink: Option<String>,
    #[serde(default)]
    metadata: Value,
}

impl SentryIssue {
    fn into_issue(self, group: &GroupKey) -> Issue {
        let first_seen = self.first_seen.unwrap_or(Timestamp::UNIX_EPOCH);
        Issue {
            short_id: if self.short_id.is_empty() {
                self.id.clone()
            } else {
                self.short_id
            },
            title: self.title,
            culprit: self.culprit.filter(|c| !c.is_empty()),
            severity_level: self.level.unwrap_or_default().into(),
            status: self.status.unwrap_or_else(|| "unresolved".into()).into(),
            event_count: lenient_count(&self.count),
            affected_user_count: lenient_count(&self.user_count),
            first_seen_at: first_seen,
            last_seen_at: self.last_seen.unwrap_or(first_seen),
            permalink: self.permalink.unwrap_or_default(),
            metadata: self.metadata,
            group_key: group.clone(),
            id: self.id,
        }
    }
}

/// Counts arrive as strings (`"42"`) or numbers; anything else is zero.
fn lenient_count(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SentryComment {
    id: String,
    #[serde(default)]
    data: SentryCommentData,
    #[serde(default)]
    date_created: Option<Timestamp>,
}

#[derive(Debug, Default, Deserialize)]
struct SentryCommentData {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentryEvent {
    #[serde(rename = "eventID", default)]
    event_id: String,
    #[serde(rename = "dateCreated", default)]
    date_created: Option<Timestamp>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    entries: Vec<RawEntry>,
    #[serde(default)]
    tags: Vec<RawTag>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct RawValues<T> {
    #[serde(default = "Vec::new")]
    values: Vec<T>,
}

impl<T> Default for RawValues<T> {
    fn default() -> Self {
        Self { values: Vec::new() }
    }
}

#[derive(Debug, Deserialize)]
struct RawException {
    #[serde(rename = "type", default)]
    exc_type: Option<String>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    module: Option<String>,
    #[serde(default)]
    stacktrace: Option<RawStacktrace>,
}

#[derive(Debug, Deserialize)]
struct RawStacktrace {
    #[serde(default)]
    frames: Vec<RawFrame>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFrame {
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    abs_path: Option<String>,
    #[serde(default)]
    function: Option<String>,
    #[serde(default)]
    line_no: Option<u32>,
    #[serde(default)]
    col_no: Option<u32>,
    #[serde(default)]
    in_app: Option<bool>,
    #[serde(default)]
    context: Vec<(Option<u32>, Option<String>)>,
}

impl RawFrame {
    fn into_frame(self) -> StackFrame {
        let context_line = self.line_no.and_then(|line| {
            self.context
                .iter()
                .find(|(n, _)| *n == Some(line))
                .and_then(|(_, text)| text.clone())
        });
        StackFrame {
            filename: self.filename.or(self.abs_path),
            function: self.function,
            line_no: self.line_no,
            col_no: self.col_no,
            in_app: self.in_app.unwrap_or(false),
            context_line,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawBreadcrumb {
    #[serde(default)]
    timestamp: Option<Value>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTag {
    key: String,
    #[serde(default)]
    value: Value,
}

impl SentryEvent {
    fn into_event(self) -> IssueEvent {
        let mut exceptions = Vec::new();
        let mut breadcrumbs = Vec::new();

        for entry in self.entries {
            match entry.kind.as_str() {
                "exception" => {
                    let data: RawValues<RawException> =
                        serde_json::from_value(entry.data).unwrap_or_default();
                    exceptions.extend(data.values.into_iter().map(|e| ExceptionInfo {
                        exc_type: e.exc_type.unwrap_or_else(|| "Error".to_string()),
                        value: e.value,
                        module: e.module,
                        frames: e
                            .stacktrace
                            .map(|s| s.frames.into_iter().map(RawFrame::into_frame).collect())
                            .unwrap_or_default(),
                    }));
                }
                "breadcrumbs" => {
                    let data: RawValues<RawBreadcrumb> =
                        serde_json::from_value(entry.data).unwrap_or_default();
                    breadcrumbs.extend(data.values.into_iter().map(|b| Breadcrumb {
                        timestamp: b.timestamp.map(|t| match t {
                            Value::String(s) => s,
                            other => other.to_string(),
                        }),
                        category: b.category,
                        level: b.level,
                        message: b.message,
                    }));
                }
                _ => {}
            }
        }

        let tags = self
            .tags
            .into_iter()
            .map(|t| EventTag {
                key: t.key,
                value: match t.value {
                    Value::String(s) => s,
                    Value::Null => String::new(),
                    other => other.to_string(),
                },
            })
            .collect();

        IssueEvent {
            event_id: self.event_id,
            date_created: self.date_created,
            message: self.message.filter(|m| !m.is_empty()),
            exceptions,
            breadcrumbs,
            tags,
        }
    }
}

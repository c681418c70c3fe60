//! In-memory clients for unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::{BoardConfig, TrackerConfig};
use crate::error::{LookoutError, Result};
use crate::types::{Comment, GroupKey, Issue, IssueEvent, TaskList};

use super::{
    ClientFactory, CommentSegment, CreatedTask, IssueClient, NewTask, TaskClient, TaskDetails,
    TaskId,
};

#[derive(Default)]
pub struct FakeIssueClient {
    pub issues: Mutex<HashMap<GroupKey, Vec<Issue>>>,
    pub failing_groups: Mutex<Vec<GroupKey>>,
    pub comments: Mutex<HashMap<String, Vec<String>>>,
    pub failing_comments: Mutex<Vec<String>>,
    pub events: Mutex<HashMap<String, IssueEvent>>,
    pub posted: Mutex<Vec<(String, String)>>,
    pub resolved: Mutex<Vec<String>>,
    pub list_calls: AtomicUsize,
    pub comment_calls: AtomicUsize,
    /// Delay applied to every `list_issues` call
    pub stall: Mutex<Option<Duration>>,
}

impl FakeIssueClient {
    pub fn with_issues(self, group: &str, issues: Vec<Issue>) -> Self {
        self.issues
            .lock()
            .insert(group.parse().expect("group key"), issues);
        self
    }

    pub fn with_comment(self, issue_id: &str, text: &str) -> Self {
        self.comments
            .lock()
            .entry(issue_id.to_string())
            .or_default()
            .push(text.to_string());
        self
    }

    pub fn failing_group(self, group: &str) -> Self {
        self.failing_groups
            .lock()
            .push(group.parse().expect("group key"));
        self
    }

    pub fn stalled(self, delay: Duration) -> Self {
        *self.stall.lock() = Some(delay);
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IssueClient for FakeIssueClient {
    async fn list_issues(&self, group: &GroupKey) -> Result<Vec<Issue>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let stall = *self.stall.lock();
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }
        if self.failing_groups.lock().contains(group) {
            return Err(LookoutError::transport("Sentry", "connection refused"));
        }
        Ok(self.issues.lock().get(group).cloned().unwrap_or_default())
    }

    async fn latest_event(&self, issue_id: &str) -> Result<IssueEvent> {
        self.events
            .lock()
            .get(issue_id)
            .cloned()
            .ok_or_else(|| LookoutError::NotFound(format!("no events for issue '{issue_id}'")))
    }

    async fn list_comments(&self, issue_id: &str) -> Result<Vec<Comment>> {
        self.comment_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_comments.lock().iter().any(|i| i == issue_id) {
            return Err(LookoutError::transport("Sentry", "timed out"));
        }
        Ok(self
            .comments
            .lock()
            .get(issue_id)
            .map(|texts| {
                texts
                    .iter()
                    .enumerate()
                    .map(|(n, text)| Comment {
                        id: n.to_string(),
                        text: text.clone(),
                        created_at: None,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn post_comment(&self, issue_id: &str, text: &str) -> Result<()> {
        self.posted
            .lock()
            .push((issue_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn resolve_issue(&self, issue_id: &str) -> Result<()> {
        self.resolved.lock().push(issue_id.to_string());
        for issues in self.issues.lock().values_mut() {
            issues.retain(|i| i.id != issue_id);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeTaskClient {
    pub lists: Mutex<Vec<TaskList>>,
    pub created: Mutex<Vec<(String, NewTask)>>,
    pub comments: Mutex<Vec<(String, Vec<CommentSegment>)>>,
    pub tasks: Mutex<HashMap<String, TaskDetails>>,
    pub list_statuses: Mutex<HashMap<String, Vec<String>>>,
    pub status_updates: Mutex<Vec<(String, String)>>,
    pub list_calls: AtomicUsize,
    pub fail_lists: Mutex<bool>,
}

impl FakeTaskClient {
    pub fn with_list(self, id: &str, name: &str) -> Self {
        self.lists.lock().push(TaskList {
            id: id.to_string(),
            name: name.to_string(),
            space: "Engineering".to_string(),
            folder: None,
        });
        self
    }

    pub fn with_task(self, id: &str, list_id: &str, statuses: &[&str]) -> Self {
        self.tasks.lock().insert(
            id.to_string(),
            TaskDetails {
                id: id.to_string(),
                name: format!("Task {id}"),
                url: Some(format!("https://app.clickup.com/t/{id}")),
                status: statuses.first().map(|s| s.to_string()),
                list_id: Some(list_id.to_string()),
                list_statuses: None,
                task_statuses: None,
            },
        );
        self.list_statuses.lock().insert(
            list_id.to_string(),
            statuses.iter().map(|s| s.to_string()).collect(),
        );
        self
    }
}

#[async_trait]
impl TaskClient for FakeTaskClient {
    async fn list_task_lists(&self) -> Result<Vec<TaskList>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_lists.lock() {
            return Err(LookoutError::transport("ClickUp", "HTTP 502"));
        }
        Ok(self.lists.lock().clone())
    }

    async fn create_task(&self, list_id: &str, task: &NewTask) -> Result<CreatedTask> {
        let mut created = self.created.lock();
        created.push((list_id.to_string(), task.clone()));
        let id = format!("task{}", created.len());
        Ok(CreatedTask {
            url: format!("https://app.clickup.com/t/{id}"),
            id,
        })
    }

    async fn post_comment(&self, task: &TaskId, segments: &[CommentSegment]) -> Result<()> {
        self.comments
            .lock()
            .push((task.to_string(), segments.to_vec()));
        Ok(())
    }

    async fn get_task(&self, task: &TaskId) -> Result<TaskDetails> {
        self.tasks
            .lock()
            .get(&task.id)
            .cloned()
            .ok_or_else(|| LookoutError::NotFound(format!("task '{task}' not found")))
    }

    async fn list_statuses(&self, list_id: &str) -> Result<Vec<String>> {
        Ok(self
            .list_statuses
            .lock()
            .get(list_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_status(&self, task: &TaskId, status: &str) -> Result<()> {
        self.status_updates
            .lock()
            .push((task.to_string(), status.to_string()));
        Ok(())
    }
}

/// Hands out the same fake instances for every config.
pub struct FakeFactory {
    pub issues: Arc<FakeIssueClient>,
    pub tasks: Arc<FakeTaskClient>,
    pub task_builds: AtomicUsize,
}

impl FakeFactory {
    pub fn new(issues: FakeIssueClient, tasks: FakeTaskClient) -> Arc<Self> {
        Arc::new(Self {
            issues: Arc::new(issues),
            tasks: Arc::new(tasks),
            task_builds: AtomicUsize::new(0),
        })
    }
}

impl ClientFactory for FakeFactory {
    fn issue_client(&self, _config: &TrackerConfig) -> Result<Arc<dyn IssueClient>> {
        Ok(self.issues.clone())
    }

    fn task_client(&self, _config: &BoardConfig) -> Result<Arc<dyn TaskClient>> {
        self.task_builds.fetch_add(1, Ordering::SeqCst);
        Ok(self.tasks.clone())
    }
}

pub fn tracker(groups: &str) -> TrackerConfig {
    TrackerConfig {
        url: "https://sentry.invalid".to_string(),
        token: secrecy::SecretString::from("tok".to_string()),
        groups: crate::types::parse_group_keys(groups).expect("groups"),
        timeout: Duration::from_secs(1),
    }
}

pub fn board() -> BoardConfig {
    let mut config = BoardConfig::new("https://clickup.invalid", "pk_test", "900");
    config.list_id = Some("l1".to_string());
    config
}

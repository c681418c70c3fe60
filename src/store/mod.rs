//! The reconciled state shared by the sidebar and the tool server.
//!
//! [`StateStore`] owns two mappings: issues per configured project and task
//! references per issue. It is the only writer of either. Refreshes are
//! coalesced per mapping so that at most one upstream fetch sequence is in
//! flight at a time; callers arriving while one runs await the same result.
//! Every externally visible mutation is announced once on a broadcast channel.
//! Subscribers re-read state instead of trusting event payloads.

pub mod cache;
pub mod correlator;

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::{BoxFuture, FutureExt, Shared, join_all};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::{BoardConfig, TrackerConfig};
use crate::error::{LookoutError, Result};
use crate::remote::status::set_task_status;
use crate::remote::{
    ClientFactory, IssueClient, NewTask, TASK_MARKER_TAG, TaskClient, parse_task_id,
};
use crate::types::{GroupKey, Issue, IssueGroups, ReferenceSource, TaskList, TaskReference};

use cache::SnapshotCache;

const EVENT_CAPACITY: usize = 64;

/// A board configuration paired with a client built from it.
pub type BoardHandle = (BoardConfig, Arc<dyn TaskClient>);

/// Change notifications. Payloads are hints; re-read the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// The issue mapping (and possibly task references) changed.
    IssuesChanged,
    /// Task lists or the selected list changed.
    TasksChanged,
    /// An explicit create recorded a task reference.
    TaskReferenceChanged { issue_id: String },
}

#[derive(Default)]
struct Clients {
    issues: Option<Arc<dyn IssueClient>>,
    tasks: Option<Arc<dyn TaskClient>>,
    tracker: Option<TrackerConfig>,
    board: Option<BoardConfig>,
}

#[derive(Default)]
struct StoreState {
    groups: Arc<IssueGroups>,
    task_refs: HashMap<String, TaskReference>,
    task_lists: Arc<Vec<TaskList>>,
    selected_list: Option<String>,
    failed_groups: Vec<GroupKey>,
}

type SharedRefresh<T> = Shared<BoxFuture<'static, T>>;

/// A refresh in flight, tagged with the configuration generation it serves.
struct Inflight<T: Clone> {
    generation: u64,
    future: SharedRefresh<T>,
}

pub struct StateStore {
    factory: Arc<dyn ClientFactory>,
    clients: RwLock<Clients>,
    state: RwLock<StoreState>,
    issue_refresh: Mutex<Option<Inflight<Arc<IssueGroups>>>>,
    task_refresh: Mutex<Option<Inflight<Arc<Vec<TaskList>>>>>,
    /// Bumped by `initialize`; results of older refreshes are discarded.
    generation: AtomicU64,
    events: broadcast::Sender<StoreEvent>,
    cache: Option<SnapshotCache>,
}

impl StateStore {
    /// An unconfigured store. Nothing is fetched until [`initialize`](Self::initialize).
    pub fn new(factory: Arc<dyn ClientFactory>) -> Arc<Self> {
        Self::build(factory, None)
    }

    /// Like [`new`](Self::new), persisting every fully successful issue
    /// refresh to `cache`.
    pub fn with_cache(factory: Arc<dyn ClientFactory>, cache: SnapshotCache) -> Arc<Self> {
        Self::build(factory, Some(cache))
    }

    fn build(factory: Arc<dyn ClientFactory>, cache: Option<SnapshotCache>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            factory,
            clients: RwLock::new(Clients::default()),
            state: RwLock::new(StoreState::default()),
            issue_refresh: Mutex::new(None),
            task_refresh: Mutex::new(None),
            generation: AtomicU64::new(0),
            events,
            cache,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: StoreEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    /// (Re)create clients, clear both mappings and refresh everything.
    ///
    /// Only a tracker client construction failure is an error. Board client
    /// failures disable task features with a warning; per-group fetch failures
    /// leave that group empty.
    pub async fn initialize(
        self: &Arc<Self>,
        tracker: TrackerConfig,
        board: Option<BoardConfig>,
    ) -> Result<()> {
        self.configure(tracker, board)?;
        futures::join!(self.refresh_issues(), self.refresh_tasks());
        Ok(())
    }

    /// The setup half of [`initialize`](Self::initialize): swap clients and
    /// reset both mappings without fetching anything.
    pub fn configure(&self, tracker: TrackerConfig, board: Option<BoardConfig>) -> Result<()> {
        let issues = self.factory.issue_client(&tracker)?;
        let (tasks, board) = match board {
            Some(board) => match self.factory.task_client(&board) {
                Ok(client) => (Some(client), Some(board)),
                Err(e) => {
                    warn!("task board disabled: {e}");
                    (None, None)
                }
            },
            None => (None, None),
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.issue_refresh.lock() = None;
        *self.task_refresh.lock() = None;

        let group_count = tracker.groups.len();
        let selected_list = board.as_ref().and_then(|b| b.list_id.clone());
        *self.state.write() = StoreState {
            groups: Arc::new(IssueGroups::with_keys(&tracker.groups)),
            selected_list,
            ..StoreState::default()
        };
        let board_enabled = tasks.is_some();
        *self.clients.write() = Clients {
            issues: Some(issues),
            tasks,
            tracker: Some(tracker),
            board,
        };
        info!(generation, groups = group_count, board = board_enabled, "store configured");
        Ok(())
    }

    /// Re-fetch every configured group, correlate task references, and
    /// publish the result.
    ///
    /// Coalesced: while a refresh is in flight, callers share its result.
    /// Without tracker config this returns the current (empty) mapping.
    pub async fn refresh_issues(self: &Arc<Self>) -> Arc<IssueGroups> {
        let future = {
            let generation = self.generation.load(Ordering::SeqCst);
            let mut slot = self.issue_refresh.lock();
            match slot.as_ref() {
                Some(inflight) if inflight.generation == generation => {
                    debug!("joining in-flight issue refresh");
                    inflight.future.clone()
                }
                _ => {
                    let store = Arc::clone(self);
                    let future = async move { store.run_issue_refresh(generation).await }
                        .boxed()
                        .shared();
                    *slot = Some(Inflight {
                        generation,
                        future: future.clone(),
                    });
                    future
                }
            }
        };
        future.await
    }

    async fn run_issue_refresh(self: Arc<Self>, generation: u64) -> Arc<IssueGroups> {
        let configured = {
            let clients = self.clients.read();
            clients
                .issues
                .clone()
                .zip(clients.tracker.as_ref().map(|t| t.groups.clone()))
        };
        let Some((client, keys)) = configured else {
            self.finish_issue_refresh(generation);
            return self.issue_groups();
        };
        let previous = self.issue_groups();

        let results = join_all(keys.iter().map(|key| {
            let client = Arc::clone(&client);
            async move { (key, client.list_issues(key).await) }
        }))
        .await;

        let mut groups = IssueGroups::with_keys(&keys);
        let mut failed = Vec::new();
        for (key, result) in results {
            match result {
                Ok(issues) => groups.set(key, issues),
                Err(e) => {
                    warn!(group = %key, "issue fetch failed, keeping last known issues: {e}");
                    let kept: Vec<Issue> = previous.get(key).map(<[Issue]>::to_vec).unwrap_or_default();
                    groups.set(key, kept);
                    failed.push(key.clone());
                }
            }
        }
        let groups = Arc::new(groups);
        let links = correlator::scan_comments(client.as_ref(), &groups).await;

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(generation, "discarding issue refresh for replaced configuration");
            return self.issue_groups();
        }

        let fully_successful = failed.is_empty();
        {
            let mut state = self.state.write();
            state.groups = Arc::clone(&groups);
            state.failed_groups = failed;
            for (issue_id, url) in links {
                match state.task_refs.entry(issue_id) {
                    Entry::Vacant(slot) => {
                        slot.insert(TaskReference::scanned(url));
                    }
                    Entry::Occupied(existing) if existing.get().url == url => {}
                    // A created reference always wins; between scans the latest one does.
                    Entry::Occupied(existing)
                        if existing.get().source == ReferenceSource::Created =>
                    {
                        debug!(
                            issue = %existing.key(),
                            kept = %existing.get().url,
                            found = %url,
                            "keeping created task reference"
                        );
                    }
                    Entry::Occupied(mut existing) => {
                        existing.insert(TaskReference::scanned(url));
                    }
                }
            }
        }
        self.finish_issue_refresh(generation);

        if let Some(cache) = self.cache.as_ref().filter(|_| fully_successful)
            && let Err(e) = cache.save(&groups)
        {
            warn!("failed to write issue cache: {e}");
        }

        debug!(
            groups = groups.len(),
            issues = groups.total_issues(),
            "issue refresh finished"
        );
        self.emit(StoreEvent::IssuesChanged);
        groups
    }

    fn finish_issue_refresh(&self, generation: u64) {
        let mut slot = self.issue_refresh.lock();
        if slot.as_ref().is_some_and(|i| i.generation == generation) {
            *slot = None;
        }
    }

    /// Re-fetch the board's task lists. No-op without board config.
    ///
    /// A failed fetch keeps the previous lists.
    pub async fn refresh_tasks(self: &Arc<Self>) -> Arc<Vec<TaskList>> {
        let future = {
            let generation = self.generation.load(Ordering::SeqCst);
            let mut slot = self.task_refresh.lock();
            match slot.as_ref() {
                Some(inflight) if inflight.generation == generation => inflight.future.clone(),
                _ => {
                    let store = Arc::clone(self);
                    let future = async move { store.run_task_refresh(generation).await }
                        .boxed()
                        .shared();
                    *slot = Some(Inflight {
                        generation,
                        future: future.clone(),
                    });
                    future
                }
            }
        };
        future.await
    }

    async fn run_task_refresh(self: Arc<Self>, generation: u64) -> Arc<Vec<TaskList>> {
        let client = self.clients.read().tasks.clone();
        let Some(client) = client else {
            self.finish_task_refresh(generation);
            return self.task_lists();
        };

        let lists = match client.list_task_lists().await {
            Ok(lists) => Arc::new(lists),
            Err(e) => {
                warn!("task list fetch failed, keeping previous lists: {e}");
                self.finish_task_refresh(generation);
                return self.task_lists();
            }
        };

        if self.generation.load(Ordering::SeqCst) != generation {
            return self.task_lists();
        }
        self.state.write().task_lists = Arc::clone(&lists);
        self.finish_task_refresh(generation);
        debug!(lists = lists.len(), "task list refresh finished");
        self.emit(StoreEvent::TasksChanged);
        lists
    }

    fn finish_task_refresh(&self, generation: u64) {
        let mut slot = self.task_refresh.lock();
        if slot.as_ref().is_some_and(|i| i.generation == generation) {
            *slot = None;
        }
    }

    /// Create a board task for an issue in the selected list and record it.
    ///
    /// Returns the existing reference without calling the board when the
    /// issue already has one. After creating, a comment with the task URL is
    /// posted on the issue so later scans rediscover the link; a failure
    /// there is only logged.
    pub async fn create_task_for_issue(
        &self,
        issue_id: &str,
        title: &str,
        url: &str,
    ) -> Result<TaskReference> {
        let issue = self.issue_groups().find(issue_id).cloned();
        let key = issue
            .as_ref()
            .map(|i| i.id.clone())
            .unwrap_or_else(|| issue_id.trim().to_string());
        if let Some(existing) = self.task_reference(&key) {
            debug!(issue = %key, "task already linked");
            return Ok(existing);
        }

        let (board, tasks) = self.board().ok_or_else(|| {
            LookoutError::NotConfigured("task board is not configured".to_string())
        })?;
        let list_id = self.selected_task_list().ok_or_else(|| {
            LookoutError::NotConfigured("no task list selected for new tasks".to_string())
        })?;

        let task = NewTask {
            name: title.to_string(),
            description: task_description(title, url, issue.as_ref()),
            tags: vec![TASK_MARKER_TAG.to_string()],
            custom_fields: board.custom_fields.clone(),
        };
        let created = tasks.create_task(&list_id, &task).await?;
        info!(issue = %key, task = %created.id, list = %list_id, "task created");

        let reference = TaskReference::created(&created.url);
        self.state
            .write()
            .task_refs
            .insert(key.clone(), reference.clone());
        self.emit(StoreEvent::TaskReferenceChanged {
            issue_id: key.clone(),
        });

        if let Some(issues) = self.issue_client() {
            let note = format!("ClickUp task: {}", created.url);
            if let Err(e) = issues.post_comment(&key, &note).await {
                warn!(issue = %key, "could not link task on the issue: {e}");
            }
        }
        Ok(reference)
    }

    /// Resolve an issue upstream, then refresh issues.
    ///
    /// When `board` names a completion status and the issue has a task
    /// reference, the task is moved to that status in between. The move is
    /// best effort: a failure is logged and the resolve still succeeds.
    /// Returns the status applied to the task, if any.
    pub async fn resolve_issue(
        self: &Arc<Self>,
        issue_id: &str,
        board: Option<&BoardHandle>,
    ) -> Result<Option<String>> {
        let client = self.issue_client().ok_or_else(|| {
            LookoutError::NotConfigured("issue tracker is not configured".to_string())
        })?;
        let key = self
            .issue_groups()
            .find(issue_id)
            .map(|i| i.id.clone())
            .unwrap_or_else(|| issue_id.trim().to_string());

        client.resolve_issue(&key).await?;
        info!(issue = %key, "issue resolved");

        let applied = match board {
            Some(board) => self.complete_linked_task(&key, board).await,
            None => None,
        };
        self.refresh_issues().await;
        Ok(applied)
    }

    async fn complete_linked_task(&self, issue_id: &str, board: &BoardHandle) -> Option<String> {
        let (config, tasks) = board;
        let done = config.done_status.as_deref()?;
        let reference = self.task_reference(issue_id)?;
        let task_id = match parse_task_id(&reference.url) {
            Ok(task_id) => task_id,
            Err(e) => {
                warn!(issue = %issue_id, "linked task has no usable id: {e}");
                return None;
            }
        };
        match set_task_status(tasks.as_ref(), &task_id, done).await {
            Ok((task, applied)) => {
                info!(issue = %issue_id, task = %task.id, status = %applied, "linked task completed");
                Some(applied)
            }
            Err(e) => {
                warn!(issue = %issue_id, task = %task_id, "could not complete linked task: {e}");
                None
            }
        }
    }

    /// The board configuration with its live client, when both exist.
    pub fn board(&self) -> Option<BoardHandle> {
        let clients = self.clients.read();
        match (&clients.board, &clients.tasks) {
            (Some(board), Some(tasks)) => Some((board.clone(), Arc::clone(tasks))),
            _ => None,
        }
    }

    pub fn issue_groups(&self) -> Arc<IssueGroups> {
        Arc::clone(&self.state.read().groups)
    }

    pub fn task_reference(&self, issue_id: &str) -> Option<TaskReference> {
        self.state.read().task_refs.get(issue_id).cloned()
    }

    pub fn task_references(&self) -> HashMap<String, TaskReference> {
        self.state.read().task_refs.clone()
    }

    pub fn task_lists(&self) -> Arc<Vec<TaskList>> {
        Arc::clone(&self.state.read().task_lists)
    }

    pub fn selected_task_list(&self) -> Option<String> {
        self.state.read().selected_list.clone()
    }

    /// Choose the list new tasks go to. An empty id clears the selection.
    pub fn select_task_list(&self, list_id: &str) {
        let list_id = list_id.trim();
        let selected = (!list_id.is_empty()).then(|| list_id.to_string());
        {
            let mut state = self.state.write();
            if state.selected_list == selected {
                return;
            }
            state.selected_list = selected;
        }
        self.emit(StoreEvent::TasksChanged);
    }

    /// Groups whose last fetch failed (their issues are last-known-good).
    pub fn last_refresh_failed_groups(&self) -> Vec<GroupKey> {
        self.state.read().failed_groups.clone()
    }

    pub fn is_configured(&self) -> bool {
        self.clients.read().issues.is_some()
    }

    pub fn issue_client(&self) -> Option<Arc<dyn IssueClient>> {
        self.clients.read().issues.clone()
    }

    pub fn task_client(&self) -> Option<Arc<dyn TaskClient>> {
        self.clients.read().tasks.clone()
    }

    pub fn tracker_config(&self) -> Option<TrackerConfig> {
        self.clients.read().tracker.clone()
    }

    pub fn board_config(&self) -> Option<BoardConfig> {
        self.clients.read().board.clone()
    }
}

/// Markdown body of a task created from an issue.
fn task_description(title: &str, url: &str, issue: Option<&Issue>) -> String {
    let mut out = format!("## {title}\n\n");
    if let Some(issue) = issue {
        out.push_str(&format!("- **Issue:** {}\n", issue.short_id));
        out.push_str(&format!("- **Level:** {}\n", issue.severity_level));
        out.push_str(&format!(
            "- **Events:** {} ({} users)\n",
            issue.event_count, issue.affected_user_count
        ));
        out.push_str(&format!("- **Last seen:** {}\n", issue.last_seen_at));
        out.push('\n');
    }
    out.push_str(&format!("Sentry: {url}\n"));
    out
}

//! Sidebar presentation.
//!
//! [`ViewPresenter`] turns store state into [`OutboundMessage`]s and relays
//! host intents to the store and clients. View concerns (search, sort,
//! hidden groups) live only here. Anything that touches the network is
//! spawned so the host loop never waits on upstream APIs; results come back
//! as outbound messages or, for store mutations, through the store's change
//! notifications.

pub mod messages;
pub mod projection;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::mcp::format::format_issue_details;
use crate::store::{StateStore, StoreEvent};
use crate::store::cache::CachedSnapshot;
use crate::types::GroupKey;

use messages::{InboundMessage, IssuesUpdate, OutboundMessage, PanelState};
use projection::{ViewState, project};

pub struct ViewPresenter {
    store: Arc<StateStore>,
    outbound: mpsc::UnboundedSender<OutboundMessage>,
    view: ViewState,
    /// Tracker configuration exists, even if the store is not initialized yet.
    configured: bool,
    /// Shown until the first live issue refresh lands.
    cached: Option<CachedSnapshot>,
    badge: usize,
}

impl ViewPresenter {
    pub fn new(
        store: Arc<StateStore>,
        outbound: mpsc::UnboundedSender<OutboundMessage>,
        configured: bool,
    ) -> Self {
        let badge = store.issue_groups().unresolved_count();
        Self {
            store,
            outbound,
            view: ViewState::default(),
            configured,
            cached: None,
            badge,
        }
    }

    /// Show `snapshot` until live data arrives, and push it.
    pub fn show_cached(&mut self, snapshot: CachedSnapshot) {
        self.badge = snapshot.groups.unresolved_count();
        self.cached = Some(snapshot);
        self.push_update();
    }

    pub fn badge(&self) -> usize {
        self.badge
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    /// React to a store change: recompute the badge and push a snapshot.
    ///
    /// The cached snapshot is replaced by the first issue refresh only.
    pub fn on_store_event(&mut self, event: &StoreEvent) {
        if *event == StoreEvent::IssuesChanged {
            self.cached = None;
        }
        if self.cached.is_none() {
            self.badge = self.store.issue_groups().unresolved_count();
        }
        self.push_update();
    }

    /// The current panel snapshot. Pure; performs no I/O.
    pub fn snapshot(&self) -> IssuesUpdate {
        if !self.configured {
            return IssuesUpdate::not_configured();
        }
        let refs = self.store.task_references();
        let (state, groups, captured_at) = match &self.cached {
            Some(cached) => (
                PanelState::Cached,
                project(&cached.groups, &refs, &self.view),
                Some(cached.captured_at),
            ),
            None => (
                PanelState::Configured,
                project(&self.store.issue_groups(), &refs, &self.view),
                None,
            ),
        };
        IssuesUpdate {
            state,
            groups,
            badge: self.badge,
            task_lists: self.store.task_lists().as_ref().clone(),
            selected_list: self.store.selected_task_list(),
            board_configured: self.store.board_config().is_some(),
            search: self.view.search.clone(),
            sort: self.view.sort,
            captured_at,
        }
    }

    pub fn send(&self, message: OutboundMessage) {
        if self.outbound.send(message).is_err() {
            debug!("host output closed, dropping message");
        }
    }

    fn push_update(&self) {
        self.send(OutboundMessage::UpdateIssues(self.snapshot()));
    }

    /// Handle one host intent.
    pub fn handle(&mut self, message: InboundMessage) {
        debug!(?message, "sidebar intent");
        if !self.configured {
            if message == InboundMessage::OpenSettings {
                self.send(OutboundMessage::OpenSettings);
            }
            self.push_update();
            return;
        }

        match message {
            InboundMessage::GetInitialState => self.push_update(),
            InboundMessage::Refresh => self.refresh(),
            InboundMessage::ResolveIssue { issue_id } => self.resolve_issue(issue_id),
            InboundMessage::FixWithAi { issue_id } => self.fix_with_ai(issue_id),
            InboundMessage::OpenInBrowser { url } => self.send(OutboundMessage::OpenUrl { url }),
            InboundMessage::CreateTaskForIssue {
                issue_id,
                title,
                url,
            } => self.create_task(issue_id, title, url),
            InboundMessage::OpenTask { issue_id } => match self.store.task_reference(&issue_id) {
                Some(reference) => self.send(OutboundMessage::OpenUrl { url: reference.url }),
                None => self.send(OutboundMessage::warning("No task is linked to this issue")),
            },
            InboundMessage::SelectTaskList { list_id } => self.store.select_task_list(&list_id),
            InboundMessage::OpenSettings => self.send(OutboundMessage::OpenSettings),
            InboundMessage::SetSearch { query } => {
                self.view.search = query;
                self.push_update();
            }
            InboundMessage::SetSort { sort } => {
                self.view.sort = sort;
                self.push_update();
            }
            InboundMessage::ToggleGroup { group } => match group.parse::<GroupKey>() {
                Ok(key) => {
                    self.view.toggle_group(&key);
                    self.push_update();
                }
                Err(e) => self.send(OutboundMessage::error(e.to_string())),
            },
        }
    }

    fn refresh(&self) {
        self.send(OutboundMessage::LoadingState { loading: true });
        let store = Arc::clone(&self.store);
        let outbound = self.outbound.clone();
        tokio::spawn(async move {
            futures::join!(store.refresh_issues(), store.refresh_tasks());
            let failed = store.last_refresh_failed_groups();
            if !failed.is_empty() {
                let names: Vec<String> = failed.iter().map(ToString::to_string).collect();
                let _ = outbound.send(OutboundMessage::warning(format!(
                    "Could not refresh {}; showing last known issues",
                    names.join(", ")
                )));
            }
            let _ = outbound.send(OutboundMessage::LoadingState { loading: false });
        });
    }

    fn resolve_issue(&self, issue_id: String) {
        if self.store.issue_client().is_none() {
            self.send(OutboundMessage::error("Sentry is not connected yet"));
            return;
        }
        self.send(OutboundMessage::ResolveStart {
            issue_id: issue_id.clone(),
        });
        let store = Arc::clone(&self.store);
        let outbound = self.outbound.clone();
        tokio::spawn(async move {
            let board = store.board();
            if let Err(e) = store.resolve_issue(&issue_id, board.as_ref()).await {
                warn!(issue = %issue_id, "resolve failed: {e}");
                let _ = outbound.send(OutboundMessage::error(format!(
                    "Failed to resolve issue: {e}"
                )));
                // Ends the host's resolve spinner; issue state is untouched.
                let _ = outbound.send(OutboundMessage::LoadingState { loading: false });
            }
        });
    }

    fn fix_with_ai(&self, issue_id: String) {
        let groups = self.store.issue_groups();
        let Some(issue) = groups.find(&issue_id).cloned() else {
            self.send(OutboundMessage::error(format!("Issue {issue_id} not found")));
            return;
        };
        let client = self.store.issue_client();
        let task = self.store.task_reference(&issue.id);
        let outbound = self.outbound.clone();
        tokio::spawn(async move {
            let event = match client {
                Some(client) => match client.latest_event(&issue.id).await {
                    Ok(event) => Some(event),
                    Err(e) => {
                        debug!(issue = %issue.id, "no event for prompt: {e}");
                        None
                    }
                },
                None => None,
            };
            let prompt = format!(
                "Investigate and fix this Sentry issue. Explain the root cause before changing code.\n\n{}",
                format_issue_details(&issue, event.as_ref(), task.as_ref())
            );
            let _ = outbound.send(OutboundMessage::FixWithAi { prompt });
        });
    }

    fn create_task(&self, issue_id: String, title: String, url: String) {
        let store = Arc::clone(&self.store);
        let outbound = self.outbound.clone();
        tokio::spawn(async move {
            match store.create_task_for_issue(&issue_id, &title, &url).await {
                Ok(reference) => {
                    let _ = outbound.send(OutboundMessage::info(format!(
                        "Task ready: {}",
                        reference.url
                    )));
                }
                Err(e) => {
                    warn!(issue = %issue_id, "task creation failed: {e}");
                    let _ = outbound.send(OutboundMessage::error(format!(
                        "Failed to create task: {e}"
                    )));
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::fakes::{FakeFactory, FakeIssueClient, FakeTaskClient, board, tracker};
    use crate::types::IssueStatus;
    use crate::types::fixtures::issue;
    use messages::NotifyLevel;
    use projection::SortKey;
    use std::time::Duration;

    type Outbox = mpsc::UnboundedReceiver<OutboundMessage>;

    async fn setup(issues: FakeIssueClient) -> (ViewPresenter, Outbox, Arc<FakeFactory>) {
        let factory = FakeFactory::new(issues, FakeTaskClient::default());
        let store = StateStore::new(factory.clone());
        store
            .initialize(tracker("acme/web,acme/api"), Some(board()))
            .await
            .unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        (ViewPresenter::new(store, tx, true), rx, factory)
    }

    fn web_issues() -> FakeIssueClient {
        let mut resolved = issue("acme/web", "3", "Old");
        resolved.status = IssueStatus::Resolved;
        FakeIssueClient::default().with_issues(
            "acme/web",
            vec![
                issue("acme/web", "1", "TypeError"),
                issue("acme/web", "2", "Timeout"),
                resolved,
            ],
        )
    }

    async fn next(rx: &mut Outbox) -> OutboundMessage {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("outbound message")
            .expect("channel open")
    }

    fn update(message: OutboundMessage) -> IssuesUpdate {
        match message {
            OutboundMessage::UpdateIssues(update) => update,
            other => panic!("expected updateIssues, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_initial_state() {
        let (mut presenter, mut rx, _) = setup(web_issues()).await;
        presenter.handle(InboundMessage::GetInitialState);

        let snapshot = update(next(&mut rx).await);
        assert_eq!(snapshot.state, PanelState::Configured);
        assert_eq!(snapshot.groups.len(), 2);
        assert_eq!(snapshot.groups[0].issues.len(), 3);
        assert_eq!(snapshot.badge, 2);
        assert!(snapshot.board_configured);
        assert_eq!(snapshot.selected_list.as_deref(), Some("l1"));
    }

    #[tokio::test]
    async fn test_not_configured_answers_every_intent() {
        let factory = FakeFactory::new(web_issues(), FakeTaskClient::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut presenter = ViewPresenter::new(StateStore::new(factory.clone()), tx, false);

        presenter.handle(InboundMessage::Refresh);
        assert_eq!(update(next(&mut rx).await).state, PanelState::NotConfigured);
        presenter.handle(InboundMessage::ResolveIssue {
            issue_id: "1".into(),
        });
        assert_eq!(update(next(&mut rx).await).state, PanelState::NotConfigured);
        assert_eq!(factory.issues.list_calls(), 0);
        assert!(factory.issues.resolved.lock().is_empty());
    }

    #[tokio::test]
    async fn test_search_and_sort_are_local() {
        let (mut presenter, mut rx, factory) = setup(web_issues()).await;
        let calls = factory.issues.list_calls();

        presenter.handle(InboundMessage::SetSearch {
            query: "timeout".into(),
        });
        let snapshot = update(next(&mut rx).await);
        assert_eq!(snapshot.groups[0].issues.len(), 1);
        assert_eq!(snapshot.search, "timeout");

        presenter.handle(InboundMessage::SetSort {
            sort: SortKey::EventCount,
        });
        assert_eq!(update(next(&mut rx).await).sort, SortKey::EventCount);

        presenter.handle(InboundMessage::ToggleGroup {
            group: "acme/web".into(),
        });
        assert!(update(next(&mut rx).await).groups[0].hidden);
        assert_eq!(factory.issues.list_calls(), calls);
    }

    #[tokio::test]
    async fn test_badge_follows_store_changes() {
        let (mut presenter, mut rx, factory) = setup(web_issues()).await;
        assert_eq!(presenter.badge(), 2);

        factory.issues.issues.lock().clear();
        presenter.store.refresh_issues().await;
        presenter.on_store_event(&StoreEvent::IssuesChanged);

        assert_eq!(presenter.badge(), 0);
        assert_eq!(update(next(&mut rx).await).badge, 0);
    }

    #[tokio::test]
    async fn test_cached_snapshot_until_live() {
        let (mut presenter, mut rx, _) = setup(web_issues()).await;
        let keys = crate::types::parse_group_keys("acme/web").unwrap();
        let mut groups = crate::types::IssueGroups::with_keys(&keys);
        groups.set(&keys[0], vec![issue("acme/web", "9", "Cached")]);
        presenter.show_cached(CachedSnapshot {
            captured_at: "2024-05-01T00:00:00Z".parse().unwrap(),
            groups,
        });

        let snapshot = update(next(&mut rx).await);
        assert_eq!(snapshot.state, PanelState::Cached);
        assert!(snapshot.captured_at.is_some());
        assert_eq!(snapshot.badge, 1);

        presenter.on_store_event(&StoreEvent::TasksChanged);
        assert_eq!(update(next(&mut rx).await).state, PanelState::Cached);

        presenter.on_store_event(&StoreEvent::IssuesChanged);
        let snapshot = update(next(&mut rx).await);
        assert_eq!(snapshot.state, PanelState::Configured);
        assert_eq!(snapshot.badge, 2);
    }

    #[tokio::test]
    async fn test_resolve_issue_flow() {
        let (mut presenter, mut rx, factory) = setup(web_issues()).await;
        let mut events = presenter.store.subscribe();

        presenter.handle(InboundMessage::ResolveIssue {
            issue_id: "1".into(),
        });
        assert_eq!(
            next(&mut rx).await,
            OutboundMessage::ResolveStart {
                issue_id: "1".into()
            }
        );
        tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(factory.issues.resolved.lock().as_slice(), &["1".to_string()]);
        assert!(presenter.store.issue_groups().find("1").is_none());
    }

    #[tokio::test]
    async fn test_resolve_moves_linked_task_to_done_status() {
        let issues = web_issues().with_comment("2", "https://app.clickup.com/t/xyz");
        let tasks = FakeTaskClient::default().with_task("xyz", "l1", &["open", "complete"]);
        let factory = FakeFactory::new(issues, tasks);
        let store = StateStore::new(factory.clone());
        let mut config = board();
        config.done_status = Some("complete".into());
        store
            .initialize(tracker("acme/web"), Some(config))
            .await
            .unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut presenter = ViewPresenter::new(store, tx, true);

        presenter.handle(InboundMessage::ResolveIssue {
            issue_id: "2".into(),
        });
        assert!(matches!(
            next(&mut rx).await,
            OutboundMessage::ResolveStart { .. }
        ));
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let updated = !factory.tasks.status_updates.lock().is_empty();
                if updated {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(
            factory.tasks.status_updates.lock().as_slice(),
            &[("xyz".to_string(), "complete".to_string())]
        );
    }

    #[tokio::test]
    async fn test_create_task_failure_notifies() {
        let factory = FakeFactory::new(web_issues(), FakeTaskClient::default());
        let store = StateStore::new(factory);
        store.initialize(tracker("acme/web"), None).await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut presenter = ViewPresenter::new(store, tx, true);

        presenter.handle(InboundMessage::CreateTaskForIssue {
            issue_id: "1".into(),
            title: "TypeError".into(),
            url: "https://sentry.io/i/1".into(),
        });
        match next(&mut rx).await {
            OutboundMessage::Notify { level, message } => {
                assert_eq!(level, NotifyLevel::Error);
                assert!(message.contains("not configured"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_open_task_and_fix_with_ai() {
        let (mut presenter, mut rx, _) = setup(web_issues()).await;

        presenter.handle(InboundMessage::OpenTask {
            issue_id: "1".into(),
        });
        assert!(matches!(
            next(&mut rx).await,
            OutboundMessage::Notify {
                level: NotifyLevel::Warning,
                ..
            }
        ));

        presenter.handle(InboundMessage::FixWithAi {
            issue_id: "WEB-2".into(),
        });
        match next(&mut rx).await {
            OutboundMessage::FixWithAi { prompt } => {
                assert!(prompt.contains("# WEB-2: Timeout"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

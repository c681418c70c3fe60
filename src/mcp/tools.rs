//! MCP tool implementations.
//!
//! | Tool | Description |
//! |------|-------------|
//! | `search_issues` | Search unresolved issues by text and project |
//! | `get_issue_details` | Issue metadata plus the latest event's stack trace |
//! | `list_projects` | Configured projects with issue counts |
//! | `resolve_issue` | Resolve an issue in the next release |
//! | `add_task_comment` | Comment on a board task |
//! | `set_task_status` | Move a board task to another status |
//!
//! Every tool returns either markdown text or an error result whose text is
//! `"<Kind>: <message>"`; failures never surface as protocol errors.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rmcp::handler::server::tool::ToolRouter;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::BoardConfig;
use crate::error::{ErrorKind, LookoutError, ToolError};
use crate::remote::richtext::build_comment;
use crate::remote::status::set_task_status;
use crate::remote::{ClientFactory, HttpClientFactory, IssueClient, TaskClient, parse_task_id};
use crate::store::StateStore;
use crate::types::{Issue, IssueGroups};

use super::board::{BoardConfigSource, EnvironmentSource, SharedStoreSource};
use super::format::{
    build_filter_summary, format_issue_details, format_issue_list, format_projects,
};
use super::requests::{
    AddTaskCommentRequest, GetIssueDetailsRequest, ListProjectsRequest, ResolveIssueRequest,
    SearchIssuesRequest, SetTaskStatusRequest,
};

type ToolResult = Result<String, ToolError>;

/// Board client built from a [`BoardConfigSource`] that does not own one.
type CachedBoard = Option<(BoardConfig, Arc<dyn TaskClient>)>;

/// The MCP tool handler
#[derive(Clone)]
pub struct LookoutTools {
    store: Arc<StateStore>,
    board_source: Arc<dyn BoardConfigSource>,
    factory: Arc<dyn ClientFactory>,
    board: Arc<Mutex<CachedBoard>>,
    /// Refresh the store before read tools (standalone mode).
    refresh_on_read: bool,
    tool_router: ToolRouter<Self>,
}

impl fmt::Debug for LookoutTools {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LookoutTools")
            .field("board_source", &self.board_source.name())
            .field("refresh_on_read", &self.refresh_on_read)
            .finish()
    }
}

/// Macro to register a tool with MCP.
/// Generates the ToolRoute boilerplate: deserialize arguments, call the
/// handler, and wrap the outcome as a tool result.
///
/// Missing arguments deserialize from an empty object; malformed ones become
/// a validation error result rather than a protocol error.
macro_rules! register_tool {
    ($router:expr, $name:expr, $desc:expr, $req_type:ty, $method:ident) => {{
        use rmcp::handler::server::tool::ToolRoute;
        use rmcp::model::Tool;
        use rmcp::schemars::schema_for;

        let schema_obj = match serde_json::to_value(schema_for!($req_type)) {
            Ok(serde_json::Value::Object(obj)) => obj,
            _ => serde_json::Map::new(),
        };
        let tool = Tool::new($name.to_string(), $desc.to_string(), Arc::new(schema_obj));
        let route = ToolRoute::new_dyn(
            tool,
            |ctx: rmcp::handler::server::tool::ToolCallContext<'_, LookoutTools>| {
                Box::pin(async move {
                    let this = ctx.service;
                    let args = ctx.arguments.unwrap_or_default();
                    let outcome =
                        match serde_json::from_value::<$req_type>(serde_json::Value::Object(args)) {
                            Ok(request) => this.$method(request).await,
                            Err(e) => Err(ToolError::validation(format!("invalid arguments: {e}"))),
                        };
                    Ok::<_, rmcp::model::ErrorData>(tool_result(outcome))
                })
            },
        );
        $router.add_route(route);
    }};
}

/// Wrap a tool outcome as an MCP result.
pub(crate) fn tool_result(outcome: ToolResult) -> rmcp::model::CallToolResult {
    match outcome {
        Ok(text) => rmcp::model::CallToolResult {
            content: vec![rmcp::model::Content::text(text)],
            structured_content: None,
            is_error: Some(false),
            meta: None,
        },
        Err(e) => rmcp::model::CallToolResult {
            content: vec![rmcp::model::Content::text(e.to_string())],
            structured_content: Some(json!({
                "error": { "kind": e.kind.to_string(), "message": e.message }
            })),
            is_error: Some(true),
            meta: None,
        },
    }
}

impl LookoutTools {
    /// Tools sharing the sidebar's store (in-process mode).
    pub fn shared(store: Arc<StateStore>) -> Self {
        let source = Arc::new(SharedStoreSource::new(Arc::clone(&store)));
        Self::new(store, source, Arc::new(HttpClientFactory), false)
    }

    /// Tools for the standalone server: board from the environment, issues
    /// refreshed before each read.
    pub fn standalone(store: Arc<StateStore>, factory: Arc<dyn ClientFactory>) -> Self {
        Self::new(store, Arc::new(EnvironmentSource::new()), factory, true)
    }

    pub fn new(
        store: Arc<StateStore>,
        board_source: Arc<dyn BoardConfigSource>,
        factory: Arc<dyn ClientFactory>,
        refresh_on_read: bool,
    ) -> Self {
        let mut router = ToolRouter::new();

        register_tool!(
            router,
            "search_issues",
            "Search unresolved Sentry issues. Matches the query case-insensitively against title, short id and culprit, optionally within one project (\"org/project\"). Returns at most `limit` issues (default 25) with short id and permalink.",
            SearchIssuesRequest,
            search_issues
        );

        register_tool!(
            router,
            "get_issue_details",
            "Get full details of an issue by id or short id, including the latest event's exception chain, stack trace (innermost frame first), breadcrumbs and tags.",
            GetIssueDetailsRequest,
            get_issue_details
        );

        register_tool!(
            router,
            "list_projects",
            "List configured Sentry projects with their issue counts.",
            ListProjectsRequest,
            list_projects
        );

        register_tool!(
            router,
            "resolve_issue",
            "Mark an issue as resolved in the next release.",
            ResolveIssueRequest,
            resolve_issue
        );

        register_tool!(
            router,
            "add_task_comment",
            "Add a markdown comment to a ClickUp task (id or task URL). An auto-generated footer is appended.",
            AddTaskCommentRequest,
            add_task_comment
        );

        register_tool!(
            router,
            "set_task_status",
            "Change a ClickUp task's status. The status name is matched case-insensitively against the statuses of the task's list.",
            SetTaskStatusRequest,
            set_task_status
        );

        Self {
            store,
            board_source,
            factory,
            board: Arc::new(Mutex::new(None)),
            refresh_on_read,
            tool_router: router,
        }
    }

    /// Get the tool router for use with ServerHandler
    pub fn router(&self) -> &ToolRouter<Self> {
        &self.tool_router
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Adopt a board configuration.
    ///
    /// `None` never replaces a working client, and re-applying the current
    /// configuration is a no-op. A client that cannot be built leaves the
    /// previous one in place.
    pub fn update_config(&self, config: Option<BoardConfig>) {
        let Some(config) = config else {
            debug!("no board config offered, keeping current client");
            return;
        };
        let mut board = self.board.lock();
        if board.as_ref().is_some_and(|(current, _)| current == &config) {
            return;
        }
        match self.factory.task_client(&config) {
            Ok(client) => {
                info!(team = %config.team_id, "board client configured");
                *board = Some((config, client));
            }
            Err(e) => warn!("board client not rebuilt: {e}"),
        }
    }

    fn resolve_board(&self) -> Result<(BoardConfig, Arc<dyn TaskClient>), ToolError> {
        if let (Some(config), Some(client)) =
            (self.board_source.board_config(), self.board_source.task_client())
        {
            return Ok((config, client));
        }
        self.update_config(self.board_source.board_config());
        self.board.lock().clone().ok_or_else(|| {
            ToolError::new(
                ErrorKind::NotConfigured,
                format!(
                    "task board is not configured (source: {}); set CLICKUP_API_TOKEN and CLICKUP_TEAM_ID",
                    self.board_source.name()
                ),
            )
        })
    }

    fn issue_client(&self) -> Result<Arc<dyn IssueClient>, ToolError> {
        self.store.issue_client().ok_or_else(|| {
            ToolError::new(ErrorKind::NotConfigured, "issue tracker is not configured")
        })
    }

    async fn read_groups(&self) -> Result<Arc<IssueGroups>, ToolError> {
        if !self.store.is_configured() {
            return Err(ToolError::new(
                ErrorKind::NotConfigured,
                "issue tracker is not configured",
            ));
        }
        if self.refresh_on_read {
            Ok(self.store.refresh_issues().await)
        } else {
            Ok(self.store.issue_groups())
        }
    }

    async fn find_issue(&self, id: &str) -> Result<Issue, ToolError> {
        let groups = self.read_groups().await?;
        groups.find(id).cloned().ok_or_else(|| {
            ToolError::new(ErrorKind::NotFound, format!("issue '{}' not found", id.trim()))
        })
    }

    // ========================================================================
    // Tool Implementations
    // ========================================================================

    pub async fn search_issues(&self, request: SearchIssuesRequest) -> ToolResult {
        request.validate().map_err(ToolError::validation)?;
        let groups = self.read_groups().await?;

        let project = request.project();
        if let Some(project) = &project
            && groups.get(project).is_none()
        {
            return Err(ToolError::new(
                ErrorKind::NotFound,
                format!("project '{project}' is not configured"),
            ));
        }

        let needle = request.needle();
        let matches: Vec<&Issue> = groups
            .issues()
            .filter(|i| project.as_ref().is_none_or(|p| &i.group_key == p))
            .filter(|i| i.matches_lowercase(&needle))
            .collect();
        let hits: Vec<_> = matches
            .iter()
            .take(request.limit())
            .map(|issue| (*issue, self.store.task_reference(&issue.id)))
            .collect();

        Ok(format_issue_list(
            &hits,
            matches.len(),
            &build_filter_summary(&needle, project.as_ref()),
        ))
    }

    pub async fn get_issue_details(&self, request: GetIssueDetailsRequest) -> ToolResult {
        request.validate().map_err(ToolError::validation)?;
        let issue = self.find_issue(&request.issue_id).await?;
        let client = self.issue_client()?;

        let event = match client.latest_event(&issue.id).await {
            Ok(event) => Some(event),
            Err(LookoutError::NotFound(_)) => None,
            Err(e) => {
                warn!(issue = %issue.id, "latest event unavailable: {e}");
                None
            }
        };
        let task = self.store.task_reference(&issue.id);
        Ok(format_issue_details(&issue, event.as_ref(), task.as_ref()))
    }

    pub async fn list_projects(&self, _request: ListProjectsRequest) -> ToolResult {
        let groups = self.read_groups().await?;
        Ok(format_projects(
            &groups,
            &self.store.last_refresh_failed_groups(),
        ))
    }

    pub async fn resolve_issue(&self, request: ResolveIssueRequest) -> ToolResult {
        request.validate().map_err(ToolError::validation)?;
        let issue = self.find_issue(&request.issue_id).await?;
        let board = self.resolve_board().ok();
        let applied = self.store.resolve_issue(&issue.id, board.as_ref()).await?;

        let mut out = format!(
            "Resolved **{}**: \"{}\" (in next release)",
            issue.short_id, issue.title
        );
        if let Some(status) = applied {
            out.push_str(&format!("\nLinked task moved to **{status}**"));
        }
        Ok(out)
    }

    pub async fn add_task_comment(&self, request: AddTaskCommentRequest) -> ToolResult {
        request.validate().map_err(ToolError::validation)?;
        let (config, client) = self.resolve_board()?;
        let task_id = parse_task_id(&request.task_id)?;

        let segments = build_comment(&request.comment, &config.locale);
        client.post_comment(&task_id, &segments).await?;
        info!(task = %task_id, "task comment added");
        Ok(format!("Added comment to task **{task_id}**"))
    }

    pub async fn set_task_status(&self, request: SetTaskStatusRequest) -> ToolResult {
        request.validate().map_err(ToolError::validation)?;
        let (_, client) = self.resolve_board()?;
        let task_id = parse_task_id(&request.task_id)?;

        let (task, applied) = set_task_status(client.as_ref(), &task_id, &request.status).await?;
        info!(task = %task.id, status = %applied, "task status updated");
        Ok(format!(
            "Task **{}** (\"{}\") status set to \"{applied}\"",
            task.id, task.name
        ))
    }
}

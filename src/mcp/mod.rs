//! MCP (Model Context Protocol) server.
//!
//! Exposes the issue and task operations to AI agents as tools. Two
//! deployments share the same handler:
//!
//! - standalone (`lookout mcp`): STDIO transport, configuration from the
//!   environment, issues refreshed before each read tool
//! - in-process (`lookout sidebar --mcp-socket PATH`): one connection per
//!   agent on a unix socket, all sharing the sidebar's [`StateStore`]
//!
//! # Architecture
//!
//! - `mod.rs` - Server setup and initialization
//! - `tools.rs` - Tool implementations
//! - `requests.rs` - Tool argument types and validation
//! - `format.rs` - Markdown rendering of issues
//! - `board.rs` - Board configuration sources
//! - `types.rs` - MCP-specific constants

pub mod board;
pub mod format;
pub mod requests;
pub mod tools;
pub mod types;

use std::sync::Arc;

use rmcp::{
    RoleServer, ServerHandler, ServiceExt,
    handler::server::tool::ToolCallContext,
    model::{
        CallToolRequestParam, CallToolResult, ErrorData, ListToolsResult, PaginatedRequestParam,
        ServerCapabilities, ServerInfo,
    },
    service::RequestContext,
    transport::stdio,
};
use tracing::info;

use crate::config::tracker_config_from_env;
use crate::error::{LookoutError, Result};
use crate::remote::{ClientFactory, HttpClientFactory};
use crate::store::StateStore;
use tools::LookoutTools;
use types::{MCP_PROTOCOL_VERSION, SERVER_NAME, SERVER_VERSION};

impl ServerHandler for LookoutTools {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Lookout MCP server gives access to Sentry issues and ClickUp tasks. \
                 \n\nAvailable tools:\n\
                  - search_issues: Search unresolved issues by text and project\n\
                  - get_issue_details: Issue details with stack trace, breadcrumbs and tags\n\
                  - list_projects: Configured projects with issue counts\n\
                  - resolve_issue: Resolve an issue in the next release\n\
                  - add_task_comment: Comment on a ClickUp task\n\
                  - set_task_status: Change a ClickUp task's status"
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: rmcp::model::Implementation {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
                title: None,
                description: None,
                icons: None,
                website_url: None,
            },
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _pagination: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListToolsResult, ErrorData> {
        let items = self.router().list_all();
        Ok(ListToolsResult::with_all_items(items))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        let tcc = ToolCallContext::new(self, request, context);
        self.router().call(tcc).await
    }
}

/// Serve `tools` over STDIO until the client disconnects.
pub async fn serve_stdio(tools: LookoutTools) -> Result<()> {
    let service = tools
        .serve(stdio())
        .await
        .map_err(|e| LookoutError::McpServer(format!("failed to start: {e}")))?;
    service
        .waiting()
        .await
        .map_err(|e| LookoutError::McpServer(format!("{e}")))?;
    Ok(())
}

/// Start the standalone MCP server with STDIO transport.
///
/// Tracker configuration comes from `SENTRY_URL`, `SENTRY_AUTH_TOKEN` and
/// `SENTRY_PROJECTS`; a missing variable is a configuration error naming it.
/// Board configuration is read from `CLICKUP_*` on first use.
pub async fn cmd_mcp() -> Result<()> {
    let tracker = tracker_config_from_env()?;
    info!(projects = tracker.groups.len(), "starting lookout MCP server");

    let factory: Arc<dyn ClientFactory> = Arc::new(HttpClientFactory);
    let store = StateStore::new(Arc::clone(&factory));
    store.configure(tracker, None)?;

    serve_stdio(LookoutTools::standalone(store, factory)).await
}

/// Print the MCP protocol version.
pub fn cmd_mcp_version() -> Result<()> {
    println!("MCP Protocol Version: {MCP_PROTOCOL_VERSION}");
    println!("Lookout MCP Server: {SERVER_NAME} v{SERVER_VERSION}");
    Ok(())
}

/// Accept agent connections on a unix socket, each served by tools sharing
/// `store`. Runs until the listener fails.
#[cfg(unix)]
pub async fn serve_socket(store: Arc<StateStore>, path: &std::path::Path) -> Result<()> {
    use tokio::net::UnixListener;
    use tracing::warn;

    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let listener = UnixListener::bind(path)?;
    info!(socket = %path.display(), "MCP socket listening");

    loop {
        let (stream, _) = listener.accept().await?;
        let tools = LookoutTools::shared(Arc::clone(&store));
        tokio::spawn(async move {
            match tools.serve(stream).await {
                Ok(service) => {
                    if let Err(e) = service.waiting().await {
                        warn!("MCP connection ended with error: {e}");
                    }
                }
                Err(e) => warn!("MCP connection failed to initialize: {e}"),
            }
        });
    }
}

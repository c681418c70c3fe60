//! MCP integration tests for Lookout.
//!
//! These tests drive `lookout mcp` the way an AI coding agent would: send a
//! JSON-RPC request over stdio and parse the response. Sentry is a local
//! mock server.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use serde_json::json;

mod common;

// ============================================================================
// MCP Test Harness
// ============================================================================

/// Helper struct to interact with the MCP server process
struct McpTestClient {
    child: Child,
    stdin: std::process::ChildStdin,
    stdout_reader: BufReader<std::process::ChildStdout>,
    request_id: u64,
}

impl McpTestClient {
    /// Start the MCP server process
    fn new(mut cmd: Command) -> Self {
        let mut child = cmd
            .arg("mcp")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("Failed to start MCP server");

        let stdin = child.stdin.take().expect("Failed to get stdin");
        let stdout = child.stdout.take().expect("Failed to get stdout");

        std::thread::sleep(Duration::from_millis(100));

        McpTestClient {
            child,
            stdin,
            stdout_reader: BufReader::new(stdout),
            request_id: 0,
        }
    }

    /// Send a JSON-RPC request and read the response
    fn send_request(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.request_id += 1;
        let request = json!({
            "jsonrpc": "2.0",
            "id": self.request_id,
            "method": method,
            "params": params,
        });

        let request_str = serde_json::to_string(&request).unwrap();
        writeln!(self.stdin, "{request_str}").expect("Failed to write request");
        self.stdin.flush().expect("Failed to flush stdin");

        let mut response_line = String::new();
        self.stdout_reader
            .read_line(&mut response_line)
            .expect("Failed to read response");

        serde_json::from_str(&response_line).expect("Failed to parse response JSON")
    }

    fn initialize(&mut self) -> serde_json::Value {
        let response = self.send_request(
            "initialize",
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {
                    "name": "test-client",
                    "version": "1.0.0"
                }
            }),
        );
        let notification = json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized",
            "params": {}
        });
        writeln!(self.stdin, "{notification}").expect("Failed to write notification");
        self.stdin.flush().expect("Failed to flush stdin");
        response
    }

    fn call_tool(&mut self, name: &str, arguments: serde_json::Value) -> serde_json::Value {
        self.send_request("tools/call", json!({ "name": name, "arguments": arguments }))
    }
}

impl Drop for McpTestClient {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn tool_text(response: &serde_json::Value) -> String {
    response["result"]["content"][0]["text"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

struct Fixture {
    test: common::LookoutTest,
    server: mockito::ServerGuard,
    _mocks: Vec<mockito::Mock>,
}

impl Fixture {
    fn new() -> Self {
        let test = common::LookoutTest::new();
        let mut server = mockito::Server::new();
        let mut mocks = common::mock_sentry_project(
            &mut server,
            "acme",
            "web",
            json!([
                common::sentry_issue("101", "WEB-1", "TypeError: cart is undefined"),
                common::sentry_issue("102", "WEB-2", "Timeout talking to payments"),
            ]),
        );
        mocks.extend(common::mock_sentry_project(
            &mut server,
            "acme",
            "api",
            json!([]),
        ));
        Fixture {
            test,
            server,
            _mocks: mocks,
        }
    }

    fn client(&self) -> McpTestClient {
        let mut cmd = self.test.command();
        cmd.env("SENTRY_URL", self.server.url())
            .env("SENTRY_AUTH_TOKEN", "test-token")
            .env("SENTRY_PROJECTS", "acme/web,acme/api");
        McpTestClient::new(cmd)
    }
}

// ============================================================================
// Startup
// ============================================================================

#[test]
fn test_mcp_without_env_fails_naming_variables() {
    let test = common::LookoutTest::new();
    let stderr = test.run_failure(&["mcp"]);
    assert!(stderr.contains("SENTRY_AUTH_TOKEN"), "stderr: {stderr}");
    assert!(stderr.contains("SENTRY_PROJECTS"), "stderr: {stderr}");
}

#[test]
fn test_mcp_version_flag() {
    let test = common::LookoutTest::new();
    let stdout = test.run_success(&["mcp", "--version"]);
    assert!(stdout.contains("MCP Protocol Version: 2024-11-05"));
    assert!(stdout.contains("lookout"));
}

#[test]
fn test_mcp_initialize() {
    let fixture = Fixture::new();
    let mut client = fixture.client();

    let response = client.initialize();

    assert!(response["result"].is_object());
    assert_eq!(response["result"]["serverInfo"]["name"], "lookout");
    assert!(response["result"]["capabilities"]["tools"].is_object());
}

// ============================================================================
// Tools
// ============================================================================

#[test]
fn test_mcp_tools_list() {
    let fixture = Fixture::new();
    let mut client = fixture.client();
    client.initialize();

    let response = client.send_request("tools/list", json!({}));
    let tools = response["result"]["tools"].as_array().expect("tools array");

    assert_eq!(tools.len(), 6);
    let tool_names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    for name in [
        "search_issues",
        "get_issue_details",
        "list_projects",
        "resolve_issue",
        "add_task_comment",
        "set_task_status",
    ] {
        assert!(tool_names.contains(&name), "missing {name}");
    }
    for tool in tools {
        assert!(tool["description"].is_string());
        assert_eq!(tool["inputSchema"]["type"], "object");
    }
}

#[test]
fn test_search_issues_returns_unresolved_issues() {
    let fixture = Fixture::new();
    let mut client = fixture.client();
    client.initialize();

    let response = client.call_tool("search_issues", json!({ "limit": 25 }));
    assert_ne!(response["result"]["isError"], true);

    let text = tool_text(&response);
    assert!(text.contains("WEB-1"), "text: {text}");
    assert!(text.contains("WEB-2"), "text: {text}");
    assert!(text.contains("https://sentry.io/organizations/acme/issues/101/"));
}

#[test]
fn test_search_issues_filters_by_text() {
    let fixture = Fixture::new();
    let mut client = fixture.client();
    client.initialize();

    let response = client.call_tool("search_issues", json!({ "query": "timeout" }));
    let text = tool_text(&response);
    assert!(text.contains("WEB-2"));
    assert!(!text.contains("WEB-1"));
}

#[test]
fn test_list_projects_counts() {
    let fixture = Fixture::new();
    let mut client = fixture.client();
    client.initialize();

    let response = client.call_tool("list_projects", json!({}));
    let text = tool_text(&response);
    assert!(text.contains("| acme/web | 2 | 2 |"), "text: {text}");
    assert!(text.contains("| acme/api | 0 | 0 |"), "text: {text}");
}

#[test]
fn test_unknown_issue_is_not_found_error() {
    let fixture = Fixture::new();
    let mut client = fixture.client();
    client.initialize();

    let response = client.call_tool("get_issue_details", json!({ "issue_id": "WEB-999" }));
    assert_eq!(response["result"]["isError"], true);
    assert!(tool_text(&response).starts_with("NotFound:"));
}

#[test]
fn test_invalid_arguments_are_validation_errors() {
    let fixture = Fixture::new();
    let mut client = fixture.client();
    client.initialize();

    let response = client.call_tool("search_issues", json!({ "limit": 0 }));
    assert_eq!(response["result"]["isError"], true);
    assert!(tool_text(&response).starts_with("ValidationError:"));

    let response = client.call_tool("resolve_issue", json!({ "issue_id": 42 }));
    assert_eq!(response["result"]["isError"], true);
    assert!(tool_text(&response).starts_with("ValidationError:"));
}

#[test]
fn test_task_tools_without_board_are_not_configured() {
    let fixture = Fixture::new();
    let mut client = fixture.client();
    client.initialize();

    let response = client.call_tool(
        "add_task_comment",
        json!({ "task_id": "abc123", "comment": "Fixed in **main**" }),
    );
    assert_eq!(response["result"]["isError"], true);
    assert!(tool_text(&response).starts_with("NotConfigured:"));
}

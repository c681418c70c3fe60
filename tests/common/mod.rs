#![allow(dead_code)]

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Output, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

/// Credentials and settings the binary reads from the environment.
const INHERITED_ENV: &[&str] = &[
    "SENTRY_URL",
    "SENTRY_AUTH_TOKEN",
    "SENTRY_PROJECTS",
    "CLICKUP_API_TOKEN",
    "CLICKUP_TEAM_ID",
    "CLICKUP_CUSTOM_FIELDS",
    "CLICKUP_LIST_ID",
    "CLICKUP_DONE_STATUS",
    "CLICKUP_LOCALE",
];

pub fn lookout_binary() -> &'static str {
    env!("CARGO_BIN_EXE_lookout")
}

/// Runs lookout in an isolated temp directory with its own cache dir and
/// no inherited credentials.
pub struct LookoutTest {
    pub temp_dir: TempDir,
}

impl LookoutTest {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        LookoutTest { temp_dir }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.temp_dir.path().join("cache")
    }

    /// A config path inside the temp dir (not created).
    pub fn config_path(&self) -> PathBuf {
        self.temp_dir.path().join("config.yaml")
    }

    pub fn write_config(&self, yaml: &str) -> PathBuf {
        let path = self.config_path();
        std::fs::write(&path, yaml).expect("Failed to write config");
        path
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::new(lookout_binary());
        cmd.current_dir(self.temp_dir.path())
            .env("LOOKOUT_CACHE_DIR", self.cache_dir())
            .env("LOOKOUT_LOG", "warn");
        for key in INHERITED_ENV {
            cmd.env_remove(key);
        }
        cmd
    }

    pub fn run(&self, args: &[&str]) -> Output {
        self.command()
            .args(args)
            .output()
            .expect("Failed to execute lookout command")
    }

    pub fn run_success(&self, args: &[&str]) -> String {
        let output = self.run(args);
        if !output.status.success() {
            panic!(
                "Command {:?} failed with status {:?}\nstdout: {}\nstderr: {}",
                args,
                output.status,
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
        }
        String::from_utf8_lossy(&output.stdout).to_string()
    }

    pub fn run_failure(&self, args: &[&str]) -> String {
        let output = self.run(args);
        assert!(
            !output.status.success(),
            "Expected command {:?} to fail, but it succeeded",
            args
        );
        String::from_utf8_lossy(&output.stderr).to_string()
    }
}

/// A running child process speaking JSON lines on stdin/stdout.
pub struct JsonLinesProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    lines: mpsc::Receiver<serde_json::Value>,
}

impl JsonLinesProcess {
    pub fn spawn(mut cmd: Command) -> Self {
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("Failed to start lookout");

        let stdin = child.stdin.take().expect("Failed to get stdin");
        let stdout = child.stdout.take().expect("Failed to get stdout");

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let value = serde_json::from_str(&line).expect("stdout line is JSON");
                if tx.send(value).is_err() {
                    break;
                }
            }
        });

        JsonLinesProcess {
            child,
            stdin: Some(stdin),
            lines: rx,
        }
    }

    pub fn send(&mut self, message: serde_json::Value) {
        let stdin = self.stdin.as_mut().expect("stdin already closed");
        writeln!(stdin, "{message}").expect("Failed to write message");
        stdin.flush().expect("Failed to flush stdin");
    }

    pub fn send_raw(&mut self, line: &str) {
        let stdin = self.stdin.as_mut().expect("stdin already closed");
        writeln!(stdin, "{line}").expect("Failed to write line");
        stdin.flush().expect("Failed to flush stdin");
    }

    /// Write bytes verbatim, for input that is not valid UTF-8.
    pub fn send_bytes(&mut self, bytes: &[u8]) {
        let stdin = self.stdin.as_mut().expect("stdin already closed");
        stdin.write_all(bytes).expect("Failed to write bytes");
        stdin.flush().expect("Failed to flush stdin");
    }

    pub fn close_stdin(&mut self) {
        self.stdin.take();
    }

    /// Next message, or `None` after `timeout`.
    pub fn next(&self, timeout: Duration) -> Option<serde_json::Value> {
        self.lines.recv_timeout(timeout).ok()
    }

    /// Skip messages until one satisfies `pred`. Panics after `timeout`.
    pub fn wait_for(
        &self,
        timeout: Duration,
        pred: impl Fn(&serde_json::Value) -> bool,
    ) -> serde_json::Value {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.lines.recv_timeout(remaining) {
                Ok(value) if pred(&value) => return value,
                Ok(_) => continue,
                Err(_) => panic!("no matching message within {timeout:?}"),
            }
        }
    }

    /// Wait for the process to exit after stdin is closed.
    pub fn wait_exit(&mut self, timeout: Duration) -> bool {
        self.close_stdin();
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Ok(Some(status)) = self.child.try_wait() {
                return status.success();
            }
            thread::sleep(Duration::from_millis(20));
        }
        false
    }
}

impl Drop for JsonLinesProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// A Sentry issue payload as returned by the issues endpoint.
pub fn sentry_issue(id: &str, short_id: &str, title: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "shortId": short_id,
        "title": title,
        "culprit": "app/checkout",
        "level": "error",
        "status": "unresolved",
        "count": "12",
        "userCount": 3,
        "firstSeen": "2024-05-01T10:00:00Z",
        "lastSeen": "2024-05-02T10:00:00Z",
        "permalink": format!("https://sentry.io/organizations/acme/issues/{id}/"),
        "metadata": {}
    })
}

/// Mock the issues and comments endpoints for one project.
pub fn mock_sentry_project(
    server: &mut mockito::Server,
    org: &str,
    project: &str,
    issues: serde_json::Value,
) -> Vec<mockito::Mock> {
    let list = server
        .mock("GET", format!("/api/0/projects/{org}/{project}/issues/").as_str())
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(issues.to_string())
        .create();
    let comments = server
        .mock(
            "GET",
            mockito::Matcher::Regex(r"^/api/0/issues/[^/]+/comments/$".to_string()),
        )
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("[]")
        .create();
    vec![list, comments]
}

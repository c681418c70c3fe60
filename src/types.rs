use std::fmt;
use std::str::FromStr;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::enum_display_fromstr;
use crate::error::LookoutError;

/// Identity of a tracker project, rendered as `org/project`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GroupKey {
    pub org: String,
    pub project: String,
}

impl GroupKey {
    pub fn new(org: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            project: project.into(),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.org, self.project)
    }
}

impl FromStr for GroupKey {
    type Err = LookoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('/') {
            Some((org, project))
                if !org.is_empty() && !project.is_empty() && !project.contains('/') =>
            {
                Ok(GroupKey::new(org, project))
            }
            _ => Err(LookoutError::Validation(format!(
                "invalid project '{s}': expected 'org/project'"
            ))),
        }
    }
}

impl TryFrom<String> for GroupKey {
    type Error = LookoutError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GroupKey> for String {
    fn from(key: GroupKey) -> Self {
        key.to_string()
    }
}

/// Parse a comma-separated list of `org/project` identifiers, skipping blanks.
///
/// Repeated identifiers keep their first position.
pub fn parse_group_keys(input: &str) -> Result<Vec<GroupKey>, LookoutError> {
    let mut keys: Vec<GroupKey> = Vec::new();
    for part in input.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let key = GroupKey::from_str(part)?;
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    Ok(keys)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SeverityLevel {
    Fatal,
    #[default]
    Error,
    Warning,
    Info,
    Debug,
}

enum_display_fromstr!(SeverityLevel, "severity level", {
    Fatal => "fatal",
    Error => "error",
    Warning => "warning",
    Info => "info",
    Debug => "debug",
});

impl From<String> for SeverityLevel {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_default()
    }
}

impl From<SeverityLevel> for String {
    fn from(level: SeverityLevel) -> Self {
        level.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IssueStatus {
    Unresolved,
    Resolved,
    Ignored,
    Other(String),
}

impl IssueStatus {
    pub fn as_str(&self) -> &str {
        match self {
            IssueStatus::Unresolved => "unresolved",
            IssueStatus::Resolved => "resolved",
            IssueStatus::Ignored => "ignored",
            IssueStatus::Other(s) => s,
        }
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for IssueStatus {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "unresolved" => IssueStatus::Unresolved,
            "resolved" => IssueStatus::Resolved,
            "ignored" => IssueStatus::Ignored,
            _ => IssueStatus::Other(value),
        }
    }
}

impl From<IssueStatus> for String {
    fn from(status: IssueStatus) -> Self {
        status.as_str().to_string()
    }
}

/// A tracker issue as last fetched. Replaced wholesale on refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: String,
    pub short_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub culprit: Option<String>,
    pub severity_level: SeverityLevel,
    pub status: IssueStatus,
    pub event_count: u64,
    pub affected_user_count: u64,
    pub first_seen_at: Timestamp,
    pub last_seen_at: Timestamp,
    pub permalink: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub group_key: GroupKey,
}

impl Issue {
    /// Case-insensitive substring match across title, short id and culprit.
    ///
    /// `needle` must already be lowercased.
    pub fn matches_lowercase(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        self.title.to_lowercase().contains(needle)
            || self.short_id.to_lowercase().contains(needle)
            || self
                .culprit
                .as_deref()
                .is_some_and(|c| c.to_lowercase().contains(needle))
    }

    pub fn is_unresolved(&self) -> bool {
        self.status == IssueStatus::Unresolved
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueGroup {
    pub key: GroupKey,
    pub issues: Vec<Issue>,
}

/// Issues per configured project, in configured order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueGroups {
    pub groups: Vec<IssueGroup>,
}

impl IssueGroups {
    /// One empty entry per key, keeping key order and dropping duplicates.
    pub fn with_keys(keys: &[GroupKey]) -> Self {
        let mut groups: Vec<IssueGroup> = Vec::with_capacity(keys.len());
        for key in keys {
            if groups.iter().any(|g| &g.key == key) {
                continue;
            }
            groups.push(IssueGroup {
                key: key.clone(),
                issues: Vec::new(),
            });
        }
        Self { groups }
    }

    pub fn keys(&self) -> impl Iterator<Item = &GroupKey> {
        self.groups.iter().map(|g| &g.key)
    }

    pub fn get(&self, key: &GroupKey) -> Option<&[Issue]> {
        self.groups
            .iter()
            .find(|g| &g.key == key)
            .map(|g| g.issues.as_slice())
    }

    /// Replace the issues of an existing key. Unknown keys are ignored.
    pub fn set(&mut self, key: &GroupKey, issues: Vec<Issue>) {
        if let Some(group) = self.groups.iter_mut().find(|g| &g.key == key) {
            group.issues = issues;
        }
    }

    pub fn issues(&self) -> impl Iterator<Item = &Issue> {
        self.groups.iter().flat_map(|g| g.issues.iter())
    }

    /// Look an issue up by full id or short id (short id case-insensitive).
    pub fn find(&self, id: &str) -> Option<&Issue> {
        let id = id.trim();
        self.issues()
            .find(|i| i.id == id)
            .or_else(|| self.issues().find(|i| i.short_id.eq_ignore_ascii_case(id)))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn total_issues(&self) -> usize {
        self.groups.iter().map(|g| g.issues.len()).sum()
    }

    pub fn unresolved_count(&self) -> usize {
        self.issues().filter(|i| i.is_unresolved()).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReferenceSource {
    /// Recorded by an explicit create action in this session.
    Created,
    /// Discovered in the issue's comment thread.
    Scanned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReference {
    pub url: String,
    pub source: ReferenceSource,
}

impl TaskReference {
    pub fn created(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            source: ReferenceSource::Created,
        }
    }

    pub fn scanned(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            source: ReferenceSource::Scanned,
        }
    }
}

/// A task list on the board, labelled with where it lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskList {
    pub id: String,
    pub name: String,
    pub space: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
}

impl TaskList {
    /// `Space / Folder / List` style label for pickers.
    pub fn label(&self) -> String {
        match &self.folder {
            Some(folder) => format!("{} / {} / {}", self.space, folder, self.name),
            None => format!("{} / {}", self.space, self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    pub filename: Option<String>,
    pub function: Option<String>,
    pub line_no: Option<u32>,
    pub col_no: Option<u32>,
    pub in_app: bool,
    pub context_line: Option<String>,
}

/// One exception of a chain, frames in upstream order (outermost first).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionInfo {
    pub exc_type: String,
    pub value: Option<String>,
    pub module: Option<String>,
    pub frames: Vec<StackFrame>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub timestamp: Option<String>,
    pub category: Option<String>,
    pub level: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTag {
    pub key: String,
    pub value: String,
}

/// The most recent event of an issue. Exceptions are in upstream order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueEvent {
    pub event_id: String,
    pub date_created: Option<Timestamp>,
    pub message: Option<String>,
    pub exceptions: Vec<ExceptionInfo>,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub tags: Vec<EventTag>,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn issue(group: &str, id: &str, title: &str) -> Issue {
        let ts: Timestamp = "2024-05-01T12:00:00Z".parse().unwrap();
        Issue {
            id: id.to_string(),
            short_id: format!("WEB-{id}"),
            title: title.to_string(),
            culprit: None,
            severity_level: SeverityLevel::Error,
            status: IssueStatus::Unresolved,
            event_count: 1,
            affected_user_count: 1,
            first_seen_at: ts,
            last_seen_at: ts,
            permalink: format!("https://sentry.io/organizations/acme/issues/{id}/"),
            metadata: serde_json::Value::Null,
            group_key: group.parse().unwrap(),
        }
    }
}

//! JSON messages exchanged with the sidebar host, one per line.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::types::TaskList;

use super::projection::{ProjectedGroup, SortKey};

/// Intents sent by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum InboundMessage {
    Refresh,
    ResolveIssue {
        issue_id: String,
    },
    #[serde(rename = "fixWithAI")]
    FixWithAi {
        issue_id: String,
    },
    OpenInBrowser {
        url: String,
    },
    CreateTaskForIssue {
        issue_id: String,
        title: String,
        url: String,
    },
    OpenTask {
        issue_id: String,
    },
    SelectTaskList {
        list_id: String,
    },
    OpenSettings,
    GetInitialState,
    SetSearch {
        #[serde(default)]
        query: String,
    },
    SetSort {
        sort: SortKey,
    },
    ToggleGroup {
        group: String,
    },
}

/// What the panel is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PanelState {
    /// Live data from the last refresh.
    Configured,
    /// Cached snapshot shown before the first live refresh.
    Cached,
    /// No tracker configuration; show setup guidance.
    NotConfigured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotifyLevel {
    Info,
    Warning,
    Error,
}

/// Full panel snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuesUpdate {
    pub state: PanelState,
    pub groups: Vec<ProjectedGroup>,
    /// Unresolved issues across all groups.
    pub badge: usize,
    pub task_lists: Vec<TaskList>,
    pub selected_list: Option<String>,
    pub board_configured: bool,
    pub search: String,
    pub sort: SortKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<Timestamp>,
}

impl IssuesUpdate {
    pub fn not_configured() -> Self {
        Self {
            state: PanelState::NotConfigured,
            groups: Vec::new(),
            badge: 0,
            task_lists: Vec::new(),
            selected_list: None,
            board_configured: false,
            search: String::new(),
            sort: SortKey::default(),
            captured_at: None,
        }
    }
}

/// Messages sent to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum OutboundMessage {
    UpdateIssues(IssuesUpdate),
    LoadingState {
        loading: bool,
    },
    ResolveStart {
        issue_id: String,
    },
    OpenUrl {
        url: String,
    },
    #[serde(rename = "fixWithAI")]
    FixWithAi {
        prompt: String,
    },
    OpenSettings,
    Notify {
        level: NotifyLevel,
        message: String,
    },
}

impl OutboundMessage {
    pub fn info(message: impl Into<String>) -> Self {
        Self::Notify {
            level: NotifyLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::Notify {
            level: NotifyLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Notify {
            level: NotifyLevel::Error,
            message: message.into(),
        }
    }
}

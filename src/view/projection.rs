//! Pure projection of store state into the sidebar's display shape.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::types::{GroupKey, Issue, IssueGroups, TaskReference};

/// Sort order of issues within a group. Always descending and stable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    #[default]
    LastSeen,
    FirstSeen,
    EventCount,
}

crate::enum_display_fromstr!(SortKey, "sort key", {
    LastSeen => "lastSeen",
    FirstSeen => "firstSeen",
    EventCount => "eventCount",
});

/// User-local view settings. Never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    pub search: String,
    pub sort: SortKey,
    pub hidden_groups: HashSet<GroupKey>,
}

impl ViewState {
    /// Flip a group's visibility; returns whether it is now hidden.
    pub fn toggle_group(&mut self, key: &GroupKey) -> bool {
        if self.hidden_groups.remove(key) {
            false
        } else {
            self.hidden_groups.insert(key.clone());
            true
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectedIssue {
    #[serde(flatten)]
    pub issue: Issue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectedGroup {
    pub key: GroupKey,
    pub hidden: bool,
    /// Issues in the group before search filtering.
    pub total: usize,
    /// Visible issues; empty when the group is hidden.
    pub issues: Vec<ProjectedIssue>,
}

/// Filter, sort and annotate `groups` for display.
pub fn project(
    groups: &IssueGroups,
    task_refs: &HashMap<String, TaskReference>,
    view: &ViewState,
) -> Vec<ProjectedGroup> {
    let needle = view.search.trim().to_lowercase();
    groups
        .groups
        .iter()
        .map(|group| {
            let hidden = view.hidden_groups.contains(&group.key);
            let issues = if hidden {
                Vec::new()
            } else {
                let mut visible: Vec<&Issue> = group
                    .issues
                    .iter()
                    .filter(|i| i.matches_lowercase(&needle))
                    .collect();
                sort_issues(&mut visible, view.sort);
                visible
                    .into_iter()
                    .map(|issue| ProjectedIssue {
                        task_url: task_refs.get(&issue.id).map(|r| r.url.clone()),
                        issue: issue.clone(),
                    })
                    .collect()
            };
            ProjectedGroup {
                key: group.key.clone(),
                hidden,
                total: group.issues.len(),
                issues,
            }
        })
        .collect()
}

/// Stable descending sort; ties keep their upstream order.
pub fn sort_issues(issues: &mut [&Issue], key: SortKey) {
    match key {
        SortKey::LastSeen => issues.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at)),
        SortKey::FirstSeen => issues.sort_by(|a, b| b.first_seen_at.cmp(&a.first_seen_at)),
        SortKey::EventCount => issues.sort_by(|a, b| b.event_count.cmp(&a.event_count)),
    }
}

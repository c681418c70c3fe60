//! Markdown rendering of issues for LLM consumption.

use std::fmt::Write;

use crate::types::{
    ExceptionInfo, GroupKey, Issue, IssueEvent, IssueGroups, StackFrame, TaskReference,
};
use crate::utils::{first_line, truncate_string};

/// Breadcrumbs shown in issue details, most recent last.
const MAX_BREADCRUMBS: usize = 10;

/// Frames shown per exception.
const MAX_FRAMES: usize = 30;

const MAX_TITLE_CHARS: usize = 120;

/// One search hit as a markdown list item.
pub fn format_issue_line(issue: &Issue, task: Option<&TaskReference>) -> String {
    let mut line = format!(
        "- **{}** [{}] {} ({} events, {} users, last seen {})\n  {}\n",
        issue.short_id,
        issue.severity_level,
        truncate_string(&issue.title, MAX_TITLE_CHARS),
        issue.event_count,
        issue.affected_user_count,
        issue.last_seen_at,
        issue.permalink,
    );
    if let Some(culprit) = issue.culprit.as_deref().filter(|c| !c.is_empty()) {
        let _ = writeln!(line, "  in `{culprit}`");
    }
    if let Some(task) = task {
        let _ = writeln!(line, "  task: {}", task.url);
    }
    line
}

/// Search results with a header naming how many matched.
pub fn format_issue_list(
    hits: &[(&Issue, Option<TaskReference>)],
    matched: usize,
    filter_summary: &str,
) -> String {
    if hits.is_empty() {
        return format!("No issues found{filter_summary}.");
    }
    let mut out = if matched > hits.len() {
        format!(
            "# Issues{filter_summary}\n\nShowing {} of {matched} matching issues.\n\n",
            hits.len()
        )
    } else {
        format!("# Issues{filter_summary}\n\n{matched} matching issues.\n\n")
    };
    for (issue, task) in hits {
        out.push_str(&format_issue_line(issue, task.as_ref()));
    }
    out
}

/// Full issue details, enriched with the latest event when available.
pub fn format_issue_details(
    issue: &Issue,
    event: Option<&IssueEvent>,
    task: Option<&TaskReference>,
) -> String {
    let mut out = format!("# {}: {}\n\n", issue.short_id, issue.title);
    let _ = writeln!(out, "- **ID:** {}", issue.id);
    let _ = writeln!(out, "- **Project:** {}", issue.group_key);
    let _ = writeln!(out, "- **Level:** {}", issue.severity_level);
    let _ = writeln!(out, "- **Status:** {}", issue.status);
    let _ = writeln!(
        out,
        "- **Events:** {} ({} users)",
        issue.event_count, issue.affected_user_count
    );
    let _ = writeln!(out, "- **First seen:** {}", issue.first_seen_at);
    let _ = writeln!(out, "- **Last seen:** {}", issue.last_seen_at);
    if let Some(culprit) = &issue.culprit {
        let _ = writeln!(out, "- **Culprit:** `{culprit}`");
    }
    let _ = writeln!(out, "- **Link:** {}", issue.permalink);
    if let Some(task) = task {
        let _ = writeln!(out, "- **Task:** {}", task.url);
    }

    let Some(event) = event else {
        out.push_str("\n_No event details available._\n");
        return out;
    };

    if let Some(message) = event.message.as_deref().map(first_line).filter(|m| !m.is_empty()) {
        let _ = write!(out, "\n## Message\n\n{message}\n");
    }

    if !event.exceptions.is_empty() {
        out.push_str("\n## Exception\n");
        // Originating exception first.
        for exception in event.exceptions.iter().rev() {
            out.push_str(&format_exception(exception));
        }
    }

    if !event.breadcrumbs.is_empty() {
        out.push_str("\n## Breadcrumbs\n\n");
        let skip = event.breadcrumbs.len().saturating_sub(MAX_BREADCRUMBS);
        for crumb in event.breadcrumbs.iter().skip(skip) {
            let _ = writeln!(
                out,
                "- {} [{}] {}: {}",
                crumb.timestamp.as_deref().unwrap_or("-"),
                crumb.level.as_deref().unwrap_or("info"),
                crumb.category.as_deref().unwrap_or("default"),
                crumb.message.as_deref().unwrap_or(""),
            );
        }
    }

    if !event.tags.is_empty() {
        out.push_str("\n## Tags\n\n");
        for tag in &event.tags {
            let _ = writeln!(out, "- {}: {}", tag.key, tag.value);
        }
    }
    out
}

fn format_exception(exception: &ExceptionInfo) -> String {
    let mut out = format!("\n### {}", exception.exc_type);
    if let Some(value) = &exception.value {
        let _ = write!(out, ": {value}");
    }
    out.push('\n');
    if let Some(module) = &exception.module {
        let _ = writeln!(out, "\nModule: `{module}`");
    }
    if exception.frames.is_empty() {
        return out;
    }

    out.push_str("\n```\n");
    // Innermost frame first.
    for frame in exception.frames.iter().rev().take(MAX_FRAMES) {
        out.push_str(&format_frame(frame));
    }
    if exception.frames.len() > MAX_FRAMES {
        let _ = writeln!(out, "... {} more frames", exception.frames.len() - MAX_FRAMES);
    }
    out.push_str("```\n");
    out
}

fn format_frame(frame: &StackFrame) -> String {
    let mut location = frame.filename.clone().unwrap_or_else(|| "<unknown>".to_string());
    if let Some(line) = frame.line_no {
        let _ = write!(location, ":{line}");
        if let Some(col) = frame.col_no {
            let _ = write!(location, ":{col}");
        }
    }
    let marker = if frame.in_app { "*" } else { " " };
    let mut out = format!(
        "{marker} at {} ({location})\n",
        frame.function.as_deref().unwrap_or("<anonymous>")
    );
    if let Some(context) = frame.context_line.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        let _ = writeln!(out, "      > {context}");
    }
    out
}

/// Configured projects with issue counts.
pub fn format_projects(groups: &IssueGroups, failed: &[GroupKey]) -> String {
    if groups.is_empty() {
        return "No projects configured.".to_string();
    }
    let mut out = String::from("# Projects\n\n| Project | Issues | Unresolved |\n|---------|--------|------------|\n");
    for group in &groups.groups {
        let unresolved = group.issues.iter().filter(|i| i.is_unresolved()).count();
        let note = if failed.contains(&group.key) {
            " (last fetch failed)"
        } else {
            ""
        };
        let _ = writeln!(
            out,
            "| {}{note} | {} | {unresolved} |",
            group.key,
            group.issues.len()
        );
    }
    let _ = write!(
        out,
        "\n{} issues across {} projects.",
        groups.total_issues(),
        groups.len()
    );
    out
}

/// Human-readable suffix describing active search filters.
pub fn build_filter_summary(needle: &str, project: Option<&GroupKey>) -> String {
    let mut parts = Vec::new();
    if !needle.is_empty() {
        parts.push(format!("matching \"{needle}\""));
    }
    if let Some(project) = project {
        parts.push(format!("in {project}"));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" {}", parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::issue;
    use crate::types::{Breadcrumb, EventTag};

    fn frame(function: &str, line: u32) -> StackFrame {
        StackFrame {
            filename: Some("app.js".into()),
            function: Some(function.into()),
            line_no: Some(line),
            in_app: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_frames_rendered_innermost_first() {
        let event = IssueEvent {
            exceptions: vec![ExceptionInfo {
                exc_type: "TypeError".into(),
                value: Some("x is undefined".into()),
                frames: vec![frame("outer", 1), frame("middle", 2), frame("inner", 3)],
                ..Default::default()
            }],
            ..Default::default()
        };
        let out = format_issue_details(&issue("acme/web", "1", "Boom"), Some(&event), None);
        let inner = out.find("inner").unwrap();
        let middle = out.find("middle").unwrap();
        let outer = out.find("outer").unwrap();
        assert!(inner < middle && middle < outer);
        assert!(out.contains("### TypeError: x is undefined"));
        assert!(out.contains("(app.js:3)"));
    }

    #[test]
    fn test_exception_chain_reversed() {
        let event = IssueEvent {
            exceptions: vec![
                ExceptionInfo {
                    exc_type: "FirstError".into(),
                    ..Default::default()
                },
                ExceptionInfo {
                    exc_type: "SecondError".into(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let out = format_issue_details(&issue("acme/web", "1", "Boom"), Some(&event), None);
        assert!(out.find("SecondError").unwrap() < out.find("FirstError").unwrap());
    }

    #[test]
    fn test_details_without_event() {
        let task = TaskReference::created("https://app.clickup.com/t/abc");
        let out = format_issue_details(&issue("acme/web", "1", "Boom"), None, Some(&task));
        assert!(out.starts_with("# WEB-1: Boom"));
        assert!(out.contains("- **Task:** https://app.clickup.com/t/abc"));
        assert!(out.contains("No event details"));
    }

    #[test]
    fn test_breadcrumbs_keep_most_recent() {
        let event = IssueEvent {
            breadcrumbs: (0..15)
                .map(|n| Breadcrumb {
                    message: Some(format!("crumb-{n:02}")),
                    ..Default::default()
                })
                .collect(),
            tags: vec![EventTag {
                key: "browser".into(),
                value: "Firefox".into(),
            }],
            ..Default::default()
        };
        let out = format_issue_details(&issue("acme/web", "1", "Boom"), Some(&event), None);
        assert!(!out.contains("crumb-04"));
        assert!(out.contains("crumb-05"));
        assert!(out.contains("crumb-14"));
        assert!(out.contains("- browser: Firefox"));
    }

    #[test]
    fn test_issue_list() {
        let a = issue("acme/web", "1", "TypeError");
        let b = issue("acme/web", "2", "Timeout");
        let hits = vec![(&a, None), (&b, None)];
        let out = format_issue_list(&hits, 2, "");
        assert!(out.contains("**WEB-1**"));
        assert!(out.contains(&a.permalink));
        assert!(out.contains("2 matching issues"));

        let out = format_issue_list(&hits[..1], 2, "");
        assert!(out.contains("Showing 1 of 2"));

        assert_eq!(format_issue_list(&[], 0, " matching \"x\""), "No issues found matching \"x\".");
    }

    #[test]
    fn test_projects_table() {
        let keys = crate::types::parse_group_keys("acme/web,acme/api").unwrap();
        let mut groups = IssueGroups::with_keys(&keys);
        groups.set(&keys[0], vec![issue("acme/web", "1", "a"), issue("acme/web", "2", "b")]);
        let out = format_projects(&groups, &keys[1..]);
        assert!(out.contains("| acme/web | 2 | 2 |"));
        assert!(out.contains("| acme/api (last fetch failed) | 0 | 0 |"));
    }

    #[test]
    fn test_filter_summary() {
        assert_eq!(build_filter_summary("", None), "");
        let key: GroupKey = "acme/web".parse().unwrap();
        assert_eq!(
            build_filter_summary("boom", Some(&key)),
            " matching \"boom\" in acme/web"
        );
    }
}

//! Task status resolution.
//!
//! Board statuses are per-list and must be sent with their exact spelling.
//! A requested name is matched case-insensitively against the task's
//! vocabulary, which is looked up in order: statuses embedded in the task's
//! list info, statuses attached to the task, then a separate list fetch.

use unicase::UniCase;

use crate::error::{LookoutError, Result};

use super::{TaskClient, TaskDetails, TaskId};

/// Where the status vocabulary came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSource {
    EmbeddedList,
    Task,
    ListFetch,
}

/// The statuses available to `task`, following the three-tier lookup.
pub async fn status_vocabulary(
    client: &dyn TaskClient,
    task: &TaskDetails,
) -> Result<(Vec<String>, StatusSource)> {
    if let Some(statuses) = task.list_statuses.as_ref().filter(|s| !s.is_empty()) {
        return Ok((statuses.clone(), StatusSource::EmbeddedList));
    }
    if let Some(statuses) = task.task_statuses.as_ref().filter(|s| !s.is_empty()) {
        return Ok((statuses.clone(), StatusSource::Task));
    }
    match &task.list_id {
        Some(list_id) => Ok((client.list_statuses(list_id).await?, StatusSource::ListFetch)),
        None => Ok((Vec::new(), StatusSource::ListFetch)),
    }
}

/// Pick the canonical spelling of `wanted` from `available`.
pub fn match_status<'a>(available: &'a [String], wanted: &str) -> Option<&'a str> {
    let wanted = UniCase::new(wanted.trim());
    available
        .iter()
        .find(|s| UniCase::new(s.as_str()) == wanted)
        .map(String::as_str)
}

/// Resolve `wanted` for `task`, or fail with `NotFound` naming every status.
pub async fn resolve_status(
    client: &dyn TaskClient,
    task: &TaskDetails,
    wanted: &str,
) -> Result<String> {
    let (available, _) = status_vocabulary(client, task).await?;
    if let Some(found) = match_status(&available, wanted) {
        return Ok(found.to_string());
    }
    let listed = if available.is_empty() {
        "none".to_string()
    } else {
        available
            .iter()
            .map(|s| format!("\"{s}\""))
            .collect::<Vec<_>>()
            .join(", ")
    };
    Err(LookoutError::NotFound(format!(
        "status \"{}\" is not available for task {}; available statuses: {listed}",
        wanted.trim(),
        task.id
    )))
}

/// Fetch the task, resolve the status name, and update it.
///
/// Returns the task and the status name actually applied.
pub async fn set_task_status(
    client: &dyn TaskClient,
    task_id: &TaskId,
    wanted: &str,
) -> Result<(TaskDetails, String)> {
    let task = client.get_task(task_id).await?;
    let status = resolve_status(client, &task, wanted).await?;
    // The fetched id is the canonical one, even for custom ids.
    client
        .update_status(&TaskId::new(task.id.clone()), &status)
        .await?;
    Ok((task, status))
}

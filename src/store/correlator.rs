//! Discovers issue → task links by scanning issue comment threads.

use std::collections::HashMap;
use std::sync::LazyLock;

use futures::StreamExt;
use regex::Regex;
use tracing::{debug, warn};

use crate::remote::IssueClient;
use crate::types::IssueGroups;

/// Comment fetches in flight at once during a scan.
const SCAN_CONCURRENCY: usize = 8;

/// ClickUp task URL: `https://app.clickup.com/t/<id>` or `/t/<team>/<custom-id>`.
static TASK_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://app\.clickup\.com/t/(?:[A-Za-z0-9_-]+/)?[A-Za-z0-9_-]+")
        .expect("regex should compile")
});

/// First task URL in `text`, if any.
pub fn find_task_url(text: &str) -> Option<&str> {
    TASK_URL_RE.find(text).map(|m| m.as_str())
}

/// Scan every issue's comments and return the first task URL found per issue.
///
/// Issues whose comments cannot be fetched are skipped.
pub async fn scan_comments(
    client: &dyn IssueClient,
    groups: &IssueGroups,
) -> HashMap<String, String> {
    let ids: Vec<String> = groups.issues().map(|i| i.id.clone()).collect();
    let scanned = ids.len();

    let found: Vec<Option<(String, String)>> = futures::stream::iter(ids)
        .map(|id| async move {
            match client.list_comments(&id).await {
                Ok(comments) => comments
                    .iter()
                    .find_map(|c| find_task_url(&c.text))
                    .map(|url| (id, url.to_string())),
                Err(e) => {
                    warn!(issue = %id, "skipping comment scan: {e}");
                    None
                }
            }
        })
        .buffered(SCAN_CONCURRENCY)
        .collect()
        .await;

    let links: HashMap<String, String> = found.into_iter().flatten().collect();
    debug!(scanned, linked = links.len(), "comment scan finished");
    links
}

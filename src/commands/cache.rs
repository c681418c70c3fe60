use std::path::Path;

use serde_json::json;

use super::{print_json, resolve_workspace};
use crate::error::Result;
use crate::store::cache::SnapshotCache;

/// Print the snapshot cache file used for a workspace.
pub fn cmd_cache_path(workspace: Option<&Path>, output_json: bool) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;
    let cache = SnapshotCache::for_workspace(&workspace)?;

    if output_json {
        print_json(&json!({
            "workspace": workspace.to_string_lossy(),
            "path": cache.path().to_string_lossy(),
            "exists": cache.path().exists(),
        }))?;
    } else {
        println!("{}", cache.path().display());
    }
    Ok(())
}

/// Delete a workspace's snapshot cache.
pub fn cmd_cache_clear(workspace: Option<&Path>, output_json: bool) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;
    let cache = SnapshotCache::for_workspace(&workspace)?;
    let removed = cache.clear()?;

    if output_json {
        print_json(&json!({
            "action": "cache_clear",
            "path": cache.path().to_string_lossy(),
            "removed": removed,
        }))?;
    } else if removed {
        println!("Deleted {}", cache.path().display());
    } else {
        println!("No cache for this workspace.");
    }
    Ok(())
}

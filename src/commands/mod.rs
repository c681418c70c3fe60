//! CLI subcommands.

mod cache;
mod config;
mod sidebar;

pub use cache::{cmd_cache_clear, cmd_cache_path};
pub use config::cmd_config_show;
pub use sidebar::{SidebarOptions, cmd_sidebar};

use std::path::{Path, PathBuf};

use crate::error::Result;

/// Print a JSON value, pretty-printed, to stdout.
pub(crate) fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `workspace`, or the current directory when not given.
pub(crate) fn resolve_workspace(workspace: Option<&Path>) -> Result<PathBuf> {
    match workspace {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(std::env::current_dir()?),
    }
}

pub mod commands;
pub mod config;
pub mod error;
mod macros;
pub mod mcp;
pub mod remote;
pub mod store;
pub mod types;
pub mod utils;
pub mod view;

#[cfg(test)]
mod test_guards;

pub use config::{BoardConfig, Config, TrackerConfig};
pub use error::{ErrorKind, LookoutError, Result};
pub use remote::{ClientFactory, HttpClientFactory, IssueClient, TaskClient};
pub use store::{StateStore, StoreEvent};
pub use types::{GroupKey, Issue, IssueGroups, TaskList, TaskReference};
pub use view::ViewPresenter;

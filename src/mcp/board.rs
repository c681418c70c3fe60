//! Where the tool server finds its task board configuration.
//!
//! In-process servers read the board from the shared [`StateStore`];
//! standalone servers derive it from the environment on first use.

use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::config::{BoardConfig, board_config_from_env};
use crate::remote::TaskClient;
use crate::store::StateStore;

pub trait BoardConfigSource: Send + Sync {
    fn board_config(&self) -> Option<BoardConfig>;

    /// A live client already bound to [`board_config`](Self::board_config),
    /// when the source owns one.
    fn task_client(&self) -> Option<Arc<dyn TaskClient>> {
        None
    }

    fn name(&self) -> &'static str;
}

/// Reads the board from the store shared with the sidebar.
pub struct SharedStoreSource {
    store: Arc<StateStore>,
}

impl SharedStoreSource {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self { store }
    }
}

impl BoardConfigSource for SharedStoreSource {
    fn board_config(&self) -> Option<BoardConfig> {
        self.store.board_config()
    }

    fn task_client(&self) -> Option<Arc<dyn TaskClient>> {
        self.store.task_client()
    }

    fn name(&self) -> &'static str {
        "shared store"
    }
}

/// Reads `CLICKUP_*` variables once, on first use.
#[derive(Default)]
pub struct EnvironmentSource {
    config: OnceLock<Option<BoardConfig>>,
}

impl EnvironmentSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A source that behaves as if the environment yielded `config`.
    pub fn with_config(config: Option<BoardConfig>) -> Self {
        Self {
            config: OnceLock::from(config),
        }
    }
}

impl BoardConfigSource for EnvironmentSource {
    fn board_config(&self) -> Option<BoardConfig> {
        self.config
            .get_or_init(|| {
                let config = board_config_from_env();
                debug!(configured = config.is_some(), "board config read from environment");
                config
            })
            .clone()
    }

    fn name(&self) -> &'static str {
        "environment"
    }
}

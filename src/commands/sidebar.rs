//! `lookout sidebar`: the editor-facing host process.
//!
//! Reads intents as JSON lines on stdin and writes outbound messages as JSON
//! lines on stdout. Logs go to stderr. One [`StateStore`] backs the panel and,
//! with `--mcp-socket`, every agent connected to the in-process tool server.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::resolve_workspace;
use crate::config::Config;
use crate::error::Result;
use crate::remote::{ClientFactory, HttpClientFactory};
use crate::store::cache::SnapshotCache;
use crate::store::{StateStore, StoreEvent};
use crate::view::ViewPresenter;
use crate::view::messages::{InboundMessage, OutboundMessage};

/// How long pending output may take to drain once stdin closes.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default)]
pub struct SidebarOptions {
    /// Config file; defaults to the platform config location.
    pub config: Option<PathBuf>,
    /// Workspace the cache snapshot belongs to; defaults to the current directory.
    pub workspace: Option<PathBuf>,
    /// Seconds between background refreshes; overrides the config file.
    pub interval: Option<u64>,
    /// Unix socket for the in-process MCP server.
    pub mcp_socket: Option<PathBuf>,
}

/// Parse one inbound line. Blank lines yield `None`.
///
/// Invalid UTF-8 is decoded lossily.
pub(crate) fn parse_inbound(line: &[u8]) -> std::result::Result<Option<InboundMessage>, String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line)
        .map(Some)
        .map_err(|e| format!("Unrecognized message: {e}"))
}

/// Write each outbound message as one JSON line until every sender is gone.
pub(crate) async fn write_outbound<W>(
    mut rx: mpsc::UnboundedReceiver<OutboundMessage>,
    mut out: W,
) -> Result<W>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        let mut line = serde_json::to_vec(&message)?;
        line.push(b'\n');
        out.write_all(&line).await?;
        out.flush().await?;
    }
    Ok(out)
}

fn spawn_refresh_timer(store: Arc<StateStore>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; initialization already fetched.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            debug!("periodic issue refresh");
            store.refresh_issues().await;
        }
    });
}

#[cfg(unix)]
fn spawn_mcp_socket(store: Arc<StateStore>, path: PathBuf) {
    tokio::spawn(async move {
        if let Err(e) = crate::mcp::serve_socket(store, &path).await {
            warn!(socket = %path.display(), "MCP socket stopped: {e}");
        }
    });
}

#[cfg(not(unix))]
fn spawn_mcp_socket(_store: Arc<StateStore>, path: PathBuf) {
    warn!(socket = %path.display(), "MCP sockets are only supported on unix");
}

/// Run the sidebar host until stdin closes.
pub async fn cmd_sidebar(options: SidebarOptions) -> Result<()> {
    let config = Config::load(options.config.as_deref())?;
    let workspace = resolve_workspace(options.workspace.as_deref())?;

    let cache = match SnapshotCache::for_workspace(&workspace) {
        Ok(cache) => Some(cache),
        Err(e) => {
            warn!("snapshot cache unavailable: {e}");
            None
        }
    };
    let factory: Arc<dyn ClientFactory> = Arc::new(HttpClientFactory);
    let store = match cache.clone() {
        Some(cache) => StateStore::with_cache(factory, cache),
        None => StateStore::new(factory),
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_outbound(rx, tokio::io::stdout()));

    let tracker = config.tracker_config();
    let mut presenter = ViewPresenter::new(Arc::clone(&store), tx, tracker.is_some());
    let mut events = store.subscribe();

    match tracker {
        Some(tracker) => {
            if let Some(snapshot) = cache.as_ref().and_then(SnapshotCache::load) {
                info!(captured_at = %snapshot.captured_at, "showing cached issues");
                presenter.show_cached(snapshot);
            }

            let board = config.board_config();
            let init_store = Arc::clone(&store);
            tokio::spawn(async move {
                if let Err(e) = init_store.initialize(tracker, board).await {
                    warn!("initialization failed: {e}");
                }
            });

            let interval = options
                .interval
                .map(|secs| Duration::from_secs(secs.max(10)))
                .unwrap_or_else(|| config.refresh_interval());
            spawn_refresh_timer(Arc::clone(&store), interval);

            if let Some(path) = options.mcp_socket {
                spawn_mcp_socket(Arc::clone(&store), path);
            }
        }
        None => info!("no tracker configuration; sidebar shows setup guidance"),
    }

    let mut stdin = BufReader::new(tokio::io::stdin());
    // Partial reads stay here across select iterations.
    let mut line = Vec::new();
    loop {
        tokio::select! {
            read = stdin.read_until(b'\n', &mut line) => {
                if read? == 0 {
                    break;
                }
                match parse_inbound(&line) {
                    Ok(Some(message)) => presenter.handle(message),
                    Ok(None) => {}
                    Err(e) => {
                        warn!("{e}");
                        presenter.send(OutboundMessage::error(e));
                    }
                }
                line.clear();
            },
            event = events.recv() => match event {
                Ok(event) => presenter.on_store_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "store notifications lagged");
                    presenter.on_store_event(&StoreEvent::IssuesChanged);
                }
                Err(RecvError::Closed) => {}
            },
        }
    }

    debug!("stdin closed, shutting down sidebar");
    drop(presenter);
    match tokio::time::timeout(DRAIN_TIMEOUT, writer).await {
        Ok(Ok(result)) => result.map(|_| ()),
        Ok(Err(e)) => {
            warn!("output task failed: {e}");
            Ok(())
        }
        Err(_) => Ok(()),
    }
}

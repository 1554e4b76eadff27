//! Read side of the watcher: in-memory snapshot and persisted history.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::database::{HistoryStore, TimeOrder};
use crate::monitoring::{HostStatus, ServerStatus};
use crate::notify::StatusReporter;
use crate::orchestrator::WatcherCommand;
use crate::registry::Registry;
use crate::tracker::{KnownStatus, StateTracker};

/// Most records served by one history request
pub const HISTORY_LIMIT: usize = 1024;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("watcher is not running")]
    WatcherGone,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerLink {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostView {
    pub stealth: bool,
    pub servers: BTreeMap<String, ServerLink>,
    pub latest_ping: Option<HostStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerView {
    pub host: String,
    pub latest_status: Option<ServerStatus>,
    pub last_known_status: Option<KnownStatus>,
}

/// Everything the watcher currently knows, keyed by host and server
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub hosts: BTreeMap<String, HostView>,
    pub servers: BTreeMap<String, ServerView>,
}

impl Snapshot {
    pub fn collect(registry: &Registry, tracker: &StateTracker, pings: &HashMap<String, HostStatus>) -> Self {
        let hosts = registry
            .hosts()
            .map(|host| {
                let servers = registry
                    .servers_on(host)
                    .map(|s| (s.id.clone(), ServerLink { url: s.url.to_string() }))
                    .collect();
                let view = HostView { stealth: host.stealth, servers, latest_ping: pings.get(&host.name).cloned() };
                (host.name.clone(), view)
            })
            .collect();

        let servers = registry
            .servers()
            .map(|server| {
                let view = ServerView {
                    host: server.host.clone(),
                    latest_status: tracker.latest(&server.id).cloned(),
                    last_known_status: tracker.known(&server.id).cloned(),
                };
                (server.id.clone(), view)
            })
            .collect();

        Self { hosts, servers }
    }
}

/// Body of `GET /latest`
#[derive(Debug, Clone, Serialize)]
pub struct LatestResponse {
    pub now: i64,
    #[serde(flatten)]
    pub snapshot: Snapshot,
}

/// Body of `GET /history`
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum HistoryResponse {
    Found { now: i64, server: String, data: Vec<ServerStatus> },
    NotFound { now: i64, server: Option<String>, err: &'static str },
}

/// Reply to the chat `status` command
pub fn format_status_report(snapshot: &Snapshot) -> String {
    let mut reply = String::from("Status:\n");
    for (id, server) in &snapshot.servers {
        reply.push_str(&format!("{id}: "));
        match &server.last_known_status {
            Some(known) => {
                let state = if known.up { "UP" } else { "DOWN" };
                reply.push_str(&format!("{} as of {}\n", state, known.when.format("%Y-%m-%d %H:%M:%S UTC")));
                if let Some(latest) = &server.latest_status {
                    if let Some(busted) = &latest.busted {
                        reply.push_str(&format!(" {}:busted={}\n", latest.status_code, busted));
                    }
                }
            }
            None => reply.push_str("status not known (ask me later)\n"),
        }
    }
    reply
}

/// Cloneable access to a running watcher
///
/// The watcher stops once every handle is dropped.
#[derive(Clone)]
pub struct WatcherHandle {
    commands: mpsc::Sender<WatcherCommand>,
    store: Arc<dyn HistoryStore>,
    registry: Arc<Registry>,
}

impl WatcherHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<WatcherCommand>,
        store: Arc<dyn HistoryStore>,
        registry: Arc<Registry>,
    ) -> Self {
        Self { commands, store, registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    async fn send(&self, command: WatcherCommand) -> Result<(), ApiError> {
        self.commands.send(command).await.map_err(|_| ApiError::WatcherGone)
    }

    /// Start a poll of every target now.
    pub async fn poll(&self) -> Result<(), ApiError> {
        self.send(WatcherCommand::Poll).await
    }

    /// Wait until every probe started so far has been processed and its
    /// notifications handed off.
    pub async fn settle(&self) -> Result<(), ApiError> {
        let (tx, rx) = oneshot::channel();
        self.send(WatcherCommand::Settle(tx)).await?;
        rx.await.map_err(|_| ApiError::WatcherGone)
    }

    pub async fn snapshot(&self) -> Result<Snapshot, ApiError> {
        let (tx, rx) = oneshot::channel();
        self.send(WatcherCommand::Snapshot(tx)).await?;
        rx.await.map_err(|_| ApiError::WatcherGone)
    }

    pub async fn latest(&self) -> Result<LatestResponse, ApiError> {
        let snapshot = self.snapshot().await?;
        Ok(LatestResponse { now: Utc::now().timestamp_millis(), snapshot })
    }

    /// Newest records of a server; "not found" when there are none.
    pub async fn history(&self, server: Option<&str>) -> Result<HistoryResponse, ApiError> {
        let now = Utc::now().timestamp_millis();
        let Some(server) = server.filter(|s| !s.is_empty()) else {
            return Ok(HistoryResponse::NotFound { now, server: None, err: "not found" });
        };

        let data = self.store.query_latest(server, HISTORY_LIMIT, TimeOrder::NewestFirst).await?;
        if data.is_empty() {
            return Ok(HistoryResponse::NotFound { now, server: Some(server.to_string()), err: "not found" });
        }
        Ok(HistoryResponse::Found { now, server: server.to_string(), data })
    }

    pub async fn shutdown(&self) -> Result<(), ApiError> {
        self.send(WatcherCommand::Shutdown).await
    }

    /// A handle that does not keep the watcher alive
    pub fn downgrade(&self) -> WeakWatcher {
        WeakWatcher { commands: self.commands.downgrade() }
    }
}

#[derive(Clone)]
pub struct WeakWatcher {
    commands: mpsc::WeakSender<WatcherCommand>,
}

impl WeakWatcher {
    pub(crate) fn from_sender(commands: mpsc::WeakSender<WatcherCommand>) -> Self {
        Self { commands }
    }

    async fn snapshot(&self) -> Option<Snapshot> {
        let commands = self.commands.upgrade()?;
        let (tx, rx) = oneshot::channel();
        commands.send(WatcherCommand::Snapshot(tx)).await.ok()?;
        rx.await.ok()
    }
}

#[async_trait::async_trait]
impl StatusReporter for WeakWatcher {
    async fn status_report(&self) -> String {
        match self.snapshot().await {
            Some(snapshot) => format_status_report(&snapshot),
            None => "Status: watcher is shutting down\n".into(),
        }
    }
}

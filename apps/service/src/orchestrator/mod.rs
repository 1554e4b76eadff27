/// Orchestrator module - coordinates all components
///
/// The watcher is a single task that owns every piece of mutable state:
/// - Starts probes on each poll and collects their results
/// - Feeds server results through the state tracker
/// - Stores results and fans transition events out to notify channels
/// - Answers snapshot requests from the read API and chat
///
/// Probes run as independent tasks; a hung probe never delays the others.
pub mod probation;


pub use probation::ProbationTimers;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::{Snapshot, WatcherHandle, WeakWatcher};
use crate::config::Config;
use crate::database::{self, DatabaseImpl, HistoryStore, StatusRecord, TimeOrder};
use crate::events::{EventKind, TransitionEvent};
use crate::monitoring::{HostStatus, PollScheduler, ProbeExecutor, ServerStatus};
use crate::notify::{Dispatcher, Transports};
use crate::registry::Registry;
use crate::tracker::{StateTracker, Transition};

const COMMAND_BUFFER: usize = 64;

/// Requests handled by the watcher task
#[derive(Debug)]
pub enum WatcherCommand {
    /// Probe every host and server now
    Poll,
    /// Probation re-check of one server
    Recheck(String),
    Snapshot(oneshot::Sender<Snapshot>),
    /// Reply once no probe is in flight and started deliveries are done
    Settle(oneshot::Sender<()>),
    Shutdown,
}

#[derive(Debug)]
enum ProbeOutcome {
    Host(HostStatus),
    Server(ServerStatus),
}

/// Watcher timing, taken from the `[watcher]` section
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub polltime: Duration,
    pub probation_time: Duration,
}

impl Timing {
    pub fn from_config(config: &Config) -> Self {
        Self {
            polltime: Duration::from_secs(config.watcher.polltime),
            probation_time: Duration::from_secs(config.watcher.probation_time),
        }
    }
}

/// Name of this machine, as announced in the boot message
pub fn machine_name() -> String {
    match hostname::get() {
        Ok(name) if !name.is_empty() => name.to_string_lossy().into_owned(),
        Ok(_) => "localhost".to_string(),
        Err(e) => {
            warn!("Could not read the hostname: {}", e);
            "localhost".to_string()
        }
    }
}

/// The running watcher
pub struct Watcher {
    timing: Timing,
    hostname: String,
    registry: Arc<Registry>,
    store: Arc<dyn HistoryStore>,
    executor: Arc<ProbeExecutor>,
    dispatcher: Dispatcher,
    tracker: StateTracker,
    pings: HashMap<String, HostStatus>,
    probation: ProbationTimers,
    commands: mpsc::Receiver<WatcherCommand>,
    weak_commands: mpsc::WeakSender<WatcherCommand>,
    outcomes_tx: mpsc::Sender<ProbeOutcome>,
    outcomes: mpsc::Receiver<ProbeOutcome>,
    in_flight: usize,
    settle_waiters: Vec<oneshot::Sender<()>>,
    deliveries: Vec<JoinHandle<()>>,
}

impl Watcher {
    /// Build a watcher with the real database, probes and transports.
    ///
    /// Any failure here is fatal: bad configuration or an unusable store.
    pub async fn open(config: &Config) -> Result<(Self, WatcherHandle)> {
        let registry = Arc::new(Registry::from_config(config)?);
        info!(
            "Watching {} servers on {} hosts",
            registry.servers().count(),
            registry.hosts().count()
        );

        let pool = database::open(config.dbpath(), config.watcher.db_auth_token.as_deref()).await?;
        let store: Arc<dyn HistoryStore> = Arc::new(DatabaseImpl::new_from_pool(pool));

        let executor = Arc::new(
            ProbeExecutor::new(Duration::from_secs(config.watcher.probe_timeout))
                .context("creating probe executor")?,
        );

        let (mut watcher, handle) = Self::with_parts(config, registry, store, executor, Transports::standard());
        watcher.rehydrate().await?;
        Ok((watcher, handle))
    }

    /// Assemble a watcher from its parts. Needs a tokio runtime.
    pub fn with_parts(
        config: &Config,
        registry: Arc<Registry>,
        store: Arc<dyn HistoryStore>,
        executor: Arc<ProbeExecutor>,
        transports: Transports,
    ) -> (Self, WatcherHandle) {
        let (command_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (outcomes_tx, outcomes) = mpsc::channel(COMMAND_BUFFER);
        let weak_commands = command_tx.downgrade();

        let reporter = Arc::new(WeakWatcher::from_sender(weak_commands.clone()));
        let dispatcher = Dispatcher::new(config, registry.clone(), transports, reporter);

        let handle = WatcherHandle::new(command_tx, store.clone(), registry.clone());
        let watcher = Self {
            timing: Timing::from_config(config),
            hostname: machine_name(),
            registry,
            store,
            executor,
            dispatcher,
            tracker: StateTracker::new(),
            pings: HashMap::new(),
            probation: ProbationTimers::new(),
            commands,
            weak_commands,
            outcomes_tx,
            outcomes,
            in_flight: 0,
            settle_waiters: Vec::new(),
            deliveries: Vec::new(),
        };

        (watcher, handle)
    }

    /// Load the last stored status of every server.
    ///
    /// Servers restored on probation get their re-check timer again.
    pub async fn rehydrate(&mut self) -> Result<()> {
        let ids: Vec<String> = self.registry.servers().map(|s| s.id.clone()).collect();
        for id in ids {
            let mut latest = self
                .store
                .query_latest(&id, 1, TimeOrder::NewestFirst)
                .await
                .with_context(|| format!("loading last status of {id}"))?;
            match latest.pop() {
                Some(record) => self.tracker.rehydrate(record),
                None => debug!("No stored status for {}", id),
            }
            if self.tracker.is_on_probation(&id) {
                info!("{} was on probation, re-checking in {:?}", id, self.timing.probation_time);
                self.probation
                    .schedule(&id, self.timing.probation_time, self.weak_commands.clone());
            }
        }
        Ok(())
    }

    /// Run without a poll timer; polls only happen on request.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run with the poll timer; the first poll starts right away.
    pub fn spawn_scheduled(self) -> JoinHandle<()> {
        PollScheduler::new(self.weak_commands.clone(), self.timing.polltime).spawn();
        self.spawn()
    }

    async fn run(mut self) {
        info!("Watcher started@{}", self.hostname);
        let boot = TransitionEvent::boot(&self.hostname, Utc::now());
        self.dispatch(boot);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(WatcherCommand::Shutdown) | None => break,
                    Some(command) => self.handle(command),
                },
                Some(outcome) = self.outcomes.recv() => self.on_outcome(outcome).await,
            }
        }

        info!("Watcher stopping");
        self.probation.cancel_all();
        for delivery in self.deliveries.drain(..) {
            let _ = delivery.await;
        }
    }

    fn handle(&mut self, command: WatcherCommand) {
        match command {
            WatcherCommand::Poll => self.poll(Utc::now()),
            WatcherCommand::Recheck(server) => self.recheck(&server),
            WatcherCommand::Snapshot(reply) => {
                let _ = reply.send(Snapshot::collect(&self.registry, &self.tracker, &self.pings));
            }
            WatcherCommand::Settle(reply) => {
                self.settle_waiters.push(reply);
                self.release_settled();
            }
            WatcherCommand::Shutdown => {}
        }
    }

    fn poll(&mut self, when: DateTime<Utc>) {
        let hosts: Vec<String> = self.registry.pingable_hosts().map(|h| h.name.clone()).collect();
        let servers: Vec<String> = self.registry.servers().map(|s| s.id.clone()).collect();
        debug!("Poll: {} hosts, {} servers", hosts.len(), servers.len());

        for host in hosts {
            self.spawn_ping(host, when);
        }
        for server in servers {
            self.spawn_fetch(&server, when);
        }
    }

    fn recheck(&mut self, server: &str) {
        self.probation.fired(server);
        if !self.tracker.is_on_probation(server) {
            debug!("Re-check of {} skipped, no longer on probation", server);
            return;
        }
        info!("Re-checking {} after probation", server);
        self.spawn_fetch(server, Utc::now());
    }

    fn spawn_ping(&mut self, host: String, when: DateTime<Utc>) {
        let executor = self.executor.clone();
        let outcomes = self.outcomes_tx.clone();
        self.in_flight += 1;
        tokio::spawn(async move {
            let status = executor.probe_host(&host, when).await;
            let _ = outcomes.send(ProbeOutcome::Host(status)).await;
        });
    }

    fn spawn_fetch(&mut self, server: &str, when: DateTime<Utc>) {
        let Some(target) = self.registry.server(server).cloned() else {
            warn!("Unknown server {}", server);
            return;
        };
        let executor = self.executor.clone();
        let outcomes = self.outcomes_tx.clone();
        self.in_flight += 1;
        tokio::spawn(async move {
            let status = executor.fetch_status(&target, when).await;
            let _ = outcomes.send(ProbeOutcome::Server(status)).await;
        });
    }

    async fn on_outcome(&mut self, outcome: ProbeOutcome) {
        match outcome {
            ProbeOutcome::Host(status) => self.on_ping(status).await,
            ProbeOutcome::Server(status) => self.on_status(status).await,
        }
        self.in_flight = self.in_flight.saturating_sub(1);
        self.release_settled();
    }

    async fn on_ping(&mut self, mut status: HostStatus) {
        debug!("Ping {}: alive={} in {}ns", status.host, status.alive, status.ns);
        match self.store.append(&StatusRecord::Host(status.clone())).await {
            Ok(id) => status.id = Some(id),
            Err(e) => error!("Failed to store ping of {}: {:#}", status.host, e),
        }
        self.pings.insert(status.host.clone(), status);
    }

    async fn on_status(&mut self, mut status: ServerStatus) {
        debug!(
            "Status {}: code={} setup={} busted={} in {}ns",
            status.server, status.status_code, status.is_setup, status.is_busted, status.ns
        );

        let transition = self.tracker.evaluate(&mut status);

        match self.store.append(&StatusRecord::Server(status.clone())).await {
            Ok(id) => self.tracker.record_persisted(&status.server, id),
            Err(e) => error!("Failed to store status of {}: {:#}", status.server, e),
        }

        match transition {
            Transition::Baseline | Transition::Steady => {}
            Transition::Probation => {
                self.probation
                    .schedule(&status.server, self.timing.probation_time, self.weak_commands.clone());
            }
            Transition::Recovered => {
                self.probation.cancel(&status.server);
            }
            Transition::Notify(event) => {
                if event.kind == EventKind::Down {
                    self.probation.cancel(&status.server);
                }
                self.dispatch(event);
            }
        }
    }

    fn dispatch(&mut self, event: TransitionEvent) {
        self.deliveries.retain(|d| !d.is_finished());
        self.deliveries.extend(self.dispatcher.notify(&event));
    }

    fn release_settled(&mut self) {
        if self.in_flight > 0 || self.settle_waiters.is_empty() {
            return;
        }
        let waiters = std::mem::take(&mut self.settle_waiters);
        let deliveries = std::mem::take(&mut self.deliveries);
        tokio::spawn(async move {
            for delivery in deliveries {
                let _ = delivery.await;
            }
            for waiter in waiters {
                let _ = waiter.send(());
            }
        });
    }
}

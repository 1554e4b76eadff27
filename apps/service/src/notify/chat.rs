//! Chat notify channel.
//!
//! One background worker per configured account owns the session. It connects
//! on the first message, queues everything until the server reports the
//! session online, then flushes the queue in order. The same worker answers
//! `help` and `status` from buddies and greets new subscribers.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use super::DeliveryError;
use super::message::{CHAT_GREETING, CHAT_HELP, CHAT_UNKNOWN, compose};
use crate::config::{ChatConfig, ChatLogin};
use crate::events::TransitionEvent;

/// Wait before trying again after a failed connect while messages are queued
pub const RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// Something the chat server told us
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Online,
    Subscribe { from: String },
    Message { from: String, body: String },
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    Uninitialized,
    Connecting,
    Ready,
}

#[async_trait::async_trait]
pub trait ChatSession: Send + Sync {
    async fn send(&mut self, to: &str, body: &str) -> Result<(), DeliveryError>;
    async fn accept_subscription(&mut self, from: &str) -> Result<(), DeliveryError>;
}

/// Opens a chat session; server events arrive on the returned receiver,
/// which closes when the session is lost.
#[async_trait::async_trait]
pub trait ChatConnector: Send + Sync {
    async fn connect(
        &self,
        login: &ChatLogin,
    ) -> Result<(Box<dyn ChatSession>, mpsc::Receiver<ChatEvent>), DeliveryError>;
}

/// Answers the `status` chat command
#[async_trait::async_trait]
pub trait StatusReporter: Send + Sync {
    async fn status_report(&self) -> String;
}

#[derive(Debug)]
struct Outgoing {
    to: String,
    body: String,
}

/// Handle to a chat worker
#[derive(Clone)]
pub struct ChatChannel {
    name: String,
    buddies: Arc<Vec<String>>,
    outbox: mpsc::UnboundedSender<Outgoing>,
    state: watch::Receiver<ChatState>,
}

impl ChatChannel {
    /// Start the worker. Nothing connects until the first message.
    pub fn spawn(
        name: String,
        config: ChatConfig,
        connector: Arc<dyn ChatConnector>,
        reporter: Arc<dyn StatusReporter>,
    ) -> Self {
        let (outbox, rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ChatState::Uninitialized);

        let worker = ChatWorker {
            name: name.clone(),
            login: config.login,
            connector,
            reporter,
            state: state_tx,
            session: None,
            events: None,
            queue: VecDeque::new(),
            retry_at: None,
        };
        tokio::spawn(worker.run(rx));

        Self { name, buddies: Arc::new(config.buddies), outbox, state }
    }

    pub fn state(&self) -> ChatState {
        *self.state.borrow()
    }

    pub fn send(&self, to: &str, body: String) {
        if self.outbox.send(Outgoing { to: to.to_string(), body }).is_err() {
            tracing::warn!(target: "stwatch::notify", "{}: chat worker is gone, dropping message to {}", self.name, to);
        }
    }

    /// Send the event to every buddy.
    pub fn notify(&self, event: &TransitionEvent) {
        tracing::debug!(target: "stwatch::notify", "{}: sending to {:?}", self.name, self.buddies);
        let body = compose(event);
        for buddy in self.buddies.iter() {
            self.send(buddy, body.clone());
        }
    }
}

struct ChatWorker {
    name: String,
    login: ChatLogin,
    connector: Arc<dyn ChatConnector>,
    reporter: Arc<dyn StatusReporter>,
    state: watch::Sender<ChatState>,
    session: Option<Box<dyn ChatSession>>,
    events: Option<mpsc::Receiver<ChatEvent>>,
    queue: VecDeque<Outgoing>,
    retry_at: Option<Instant>,
}

async fn retry_due(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn next_event(events: &mut Option<mpsc::Receiver<ChatEvent>>) -> Option<ChatEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl ChatWorker {
    async fn run(mut self, mut outbox: mpsc::UnboundedReceiver<Outgoing>) {
        loop {
            tokio::select! {
                message = outbox.recv() => match message {
                    Some(message) => self.submit(message).await,
                    None => break,
                },
                event = next_event(&mut self.events) => self.on_event(event).await,
                () = retry_due(self.retry_at) => {
                    self.retry_at = None;
                    if self.current() == ChatState::Uninitialized && !self.queue.is_empty() {
                        self.connect().await;
                    }
                }
            }
        }
        tracing::debug!("{}: chat worker stopped", self.name);
    }

    fn current(&self) -> ChatState {
        *self.state.borrow()
    }

    async fn submit(&mut self, message: Outgoing) {
        match self.current() {
            ChatState::Ready => self.deliver(message).await,
            state => {
                self.queue.push_back(message);
                tracing::debug!(target: "stwatch::notify", "{}: queueing chat, len={}", self.name, self.queue.len());
                if state == ChatState::Uninitialized {
                    self.connect().await;
                }
            }
        }
    }

    async fn connect(&mut self) {
        self.retry_at = None;
        self.state.send_replace(ChatState::Connecting);
        tracing::debug!(
            "{}: connecting as {} @ {}:{}",
            self.name,
            self.login.jid,
            self.login.host.as_deref().unwrap_or("-"),
            self.login.port.unwrap_or_default()
        );

        match self.connector.connect(&self.login).await {
            Ok((session, events)) => {
                self.session = Some(session);
                self.events = Some(events);
            }
            Err(e) => {
                tracing::error!(target: "stwatch::notify", "{}: chat connect failed: {}", self.name, e);
                self.state.send_replace(ChatState::Uninitialized);
                if !self.queue.is_empty() {
                    self.retry_at = Some(Instant::now() + RECONNECT_DELAY);
                }
            }
        }
    }

    async fn on_event(&mut self, event: Option<ChatEvent>) {
        let Some(event) = event else {
            tracing::warn!(target: "stwatch::notify", "{}: chat session lost", self.name);
            self.session = None;
            self.events = None;
            self.state.send_replace(ChatState::Uninitialized);
            if !self.queue.is_empty() {
                self.connect().await;
            }
            return;
        };

        match event {
            ChatEvent::Online => {
                self.state.send_replace(ChatState::Ready);
                tracing::info!(target: "stwatch::notify", "{}: chat connected, processing queue of {}", self.name, self.queue.len());
                while let Some(message) = self.queue.pop_front() {
                    self.deliver(message).await;
                }
            }
            ChatEvent::Subscribe { from } => {
                tracing::info!(target: "stwatch::notify", "{}: subscribed to chat: {}", self.name, from);
                if let Some(session) = self.session.as_mut() {
                    if let Err(e) = session.accept_subscription(&from).await {
                        tracing::warn!(target: "stwatch::notify", "{}: could not accept {}: {}", self.name, from, e);
                    }
                }
                self.deliver(Outgoing { to: from, body: CHAT_GREETING.into() }).await;
            }
            ChatEvent::Message { from, body } => {
                tracing::info!(target: "stwatch::notify", "{}: message from {}: {}", self.name, from, body);
                let reply = self.reply(&body).await;
                self.deliver(Outgoing { to: from, body: reply }).await;
            }
            ChatEvent::Error(e) => {
                tracing::error!(target: "stwatch::notify", "{}: chat error: {}", self.name, e);
            }
        }
    }

    async fn reply(&self, body: &str) -> String {
        match body.split_whitespace().next().unwrap_or_default() {
            "help" => CHAT_HELP.into(),
            "status" => {
                let reporter = self.reporter.clone();
                reporter.status_report().await
            }
            _ => CHAT_UNKNOWN.into(),
        }
    }

    async fn deliver(&mut self, message: Outgoing) {
        let Some(session) = self.session.as_mut() else {
            self.queue.push_back(message);
            return;
        };
        match session.send(&message.to, &message.body).await {
            Ok(()) => tracing::debug!(target: "stwatch::notify", "{}: sent to {}", self.name, message.to),
            Err(e) => tracing::warn!(target: "stwatch::notify", "{}: chat to {} failed: {}", self.name, message.to, e),
        }
    }
}

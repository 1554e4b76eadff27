use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::WatcherCommand;

/// One-shot re-check timers, at most one per server
#[derive(Default)]
pub struct ProbationTimers {
    timers: HashMap<String, JoinHandle<()>>,
}

impl ProbationTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for a re-check of `server` after `delay`, replacing any pending one.
    pub fn schedule(&mut self, server: &str, delay: Duration, commands: mpsc::WeakSender<WatcherCommand>) {
        if let Some(previous) = self.timers.remove(server) {
            tracing::debug!("Rescheduling probation re-check of {}", server);
            previous.abort();
        }

        let id = server.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(WatcherCommand::Recheck(id)).await;
            }
        });
        self.timers.insert(server.to_string(), handle);
    }

    /// Drop a pending re-check. Returns whether one was pending.
    pub fn cancel(&mut self, server: &str) -> bool {
        match self.timers.remove(server) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Forget the timer of `server` once its re-check arrived.
    pub fn fired(&mut self, server: &str) {
        self.timers.remove(server);
    }

    #[cfg(test)]
    pub(crate) fn is_pending(&self, server: &str) -> bool {
        self.timers.get(server).is_some_and(|h| !h.is_finished())
    }

    pub fn cancel_all(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }
}

impl Drop for ProbationTimers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

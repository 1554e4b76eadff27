use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};

use crate::orchestrator::WatcherCommand;

const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Poll scheduler - asks the watcher for a poll every `polltime`
///
/// Holds only a weak sender so the watcher can stop once every handle is
/// dropped. The first tick fires immediately.
pub struct PollScheduler {
    commands: mpsc::WeakSender<WatcherCommand>,
    period: Duration,
}

impl PollScheduler {
    /// A zero `period` is raised to one second.
    pub fn new(commands: mpsc::WeakSender<WatcherCommand>, period: Duration) -> Self {
        Self { commands, period: period.max(MIN_PERIOD) }
    }

    /// Start ticking in the background
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = interval(self.period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                timer.tick().await;

                let Some(commands) = self.commands.upgrade() else {
                    tracing::debug!("Watcher gone, scheduler stopping");
                    break;
                };
                if commands.send(WatcherCommand::Poll).await.is_err() {
                    tracing::debug!("Watcher closed, scheduler stopping");
                    break;
                }
            }
        })
    }
}

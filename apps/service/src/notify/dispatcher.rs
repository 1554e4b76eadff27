use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::task::JoinHandle;

use super::chat::{ChatChannel, StatusReporter};
use super::email::EmailChannel;
use super::sms::SmsChannel;
use super::Transports;
use crate::config::{ChannelConfig, Config};
use crate::events::{EventKind, TransitionEvent};
use crate::registry::Registry;

/// A configured notify target
pub enum Channel {
    Email(Arc<EmailChannel>),
    Chat(ChatChannel),
    Sms(Arc<SmsChannel>),
    Disabled,
    Unsupported(&'static str),
}

/// Routes events to the notify targets bound to them
pub struct Dispatcher {
    channels: BTreeMap<String, Channel>,
    boot: Vec<String>,
    registry: Arc<Registry>,
}

impl Dispatcher {
    pub fn new(
        config: &Config,
        registry: Arc<Registry>,
        transports: Transports,
        reporter: Arc<dyn StatusReporter>,
    ) -> Self {
        let channels = config
            .notify
            .iter()
            .map(|(name, notify)| {
                let channel = if notify.disabled {
                    Channel::Disabled
                } else {
                    match &notify.channel {
                        ChannelConfig::Email(email) => Channel::Email(Arc::new(EmailChannel::new(
                            name.clone(),
                            email.clone(),
                            transports.mail.clone(),
                        ))),
                        ChannelConfig::Sms(sms) => {
                            Channel::Sms(Arc::new(SmsChannel::new(name.clone(), sms.clone(), transports.sms.clone())))
                        }
                        ChannelConfig::Chat(chat) => match &transports.chat {
                            Some(connector) => Channel::Chat(ChatChannel::spawn(
                                name.clone(),
                                chat.clone(),
                                connector.clone(),
                                reporter.clone(),
                            )),
                            None => {
                                tracing::warn!(target: "stwatch::notify", "{}: no chat client available, channel skipped", name);
                                Channel::Unsupported("chat")
                            }
                        },
                        ChannelConfig::Unknown => Channel::Unsupported("unknown"),
                    }
                };
                (name.clone(), channel)
            })
            .collect();

        Self { channels, boot: config.boot_targets(), registry }
    }

    /// Notify names bound to an event
    pub fn targets(&self, event: &TransitionEvent) -> Vec<String> {
        if event.kind == EventKind::Boot {
            return self.boot.clone();
        }

        let Some(server) = event.server.as_deref().and_then(|id| self.registry.server(id)) else {
            return Vec::new();
        };
        if server.disabled {
            tracing::debug!(target: "stwatch::notify", "{} is disabled, not notifying {}", server.id, event.kind);
            return Vec::new();
        }
        server.events.for_event(event.kind).to_vec()
    }

    /// Fan `event` out to every bound channel.
    ///
    /// Returns the delivery tasks; chat messages are handed to their worker
    /// and have no task of their own.
    pub fn notify(&self, event: &TransitionEvent) -> Vec<JoinHandle<()>> {
        let mut deliveries = Vec::new();

        for name in self.targets(event) {
            tracing::debug!(target: "stwatch::notify", "Considering notify {} for {}", name, event.kind);
            match self.channels.get(&name) {
                None => tracing::warn!(target: "stwatch::notify", "No notify configuration named {}", name),
                Some(Channel::Disabled) => {
                    tracing::debug!(target: "stwatch::notify", "Skipping notify as disabled: {}", name)
                }
                Some(Channel::Unsupported(kind)) => {
                    tracing::warn!(target: "stwatch::notify", "Skipping notify {}: unsupported kind {}", name, kind)
                }
                Some(Channel::Chat(chat)) => chat.notify(event),
                Some(Channel::Email(email)) => {
                    let email = email.clone();
                    let event = event.clone();
                    deliveries.push(tokio::spawn(async move { email.deliver(&event).await }));
                }
                Some(Channel::Sms(sms)) => {
                    let sms = sms.clone();
                    let event = event.clone();
                    deliveries.push(tokio::spawn(async move { sms.deliver(&event).await }));
                }
            }
        }

        deliveries
    }
}

/// Notification delivery
///
/// Events are fanned out to every bound channel. A channel failing never
/// stops the others; outcomes are logged under the `stwatch::notify` target.
pub mod chat;
pub mod dispatcher;
pub mod email;
pub mod message;
pub mod sms;

use std::sync::Arc;

use thiserror::Error;

pub use chat::{ChatChannel, ChatConnector, ChatEvent, ChatSession, ChatState, StatusReporter};
pub use dispatcher::{Channel, Dispatcher};
pub use email::{EmailChannel, MailSession, MailTransport, OutgoingMail, SmtpMailer};
pub use sms::{SmsChannel, SmsClient, SmsProvider, TwilioProvider};

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("smtp: {0}")]
    Mail(#[from] lettre::transport::smtp::Error),
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("could not build message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("sms rejected: {0}")]
    Sms(String),
    #[error("chat: {0}")]
    Chat(String),
    #[error("{0}")]
    Rejected(String),
}

/// Outbound connectors used by the channels
#[derive(Clone)]
pub struct Transports {
    pub mail: Arc<dyn MailTransport>,
    pub sms: Arc<dyn SmsProvider>,
    /// No chat client is linked by default.
    pub chat: Option<Arc<dyn ChatConnector>>,
}

impl Transports {
    pub fn standard() -> Self {
        Self {
            mail: Arc::new(SmtpMailer),
            sms: Arc::new(TwilioProvider::default()),
            chat: None,
        }
    }
}

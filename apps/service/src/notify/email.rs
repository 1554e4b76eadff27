use std::sync::Arc;

use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::DeliveryError;
use super::message::{email_body, email_subject};
use crate::config::{EmailConfig, SmtpSettings};
use crate::events::TransitionEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Opens a mail session for one delivery
#[async_trait::async_trait]
pub trait MailTransport: Send + Sync {
    async fn open(&self, smtp: &SmtpSettings) -> Result<Box<dyn MailSession>, DeliveryError>;
}

#[async_trait::async_trait]
pub trait MailSession: Send {
    /// Send one message and return the server's receipt
    async fn send(&mut self, mail: &OutgoingMail) -> Result<String, DeliveryError>;

    async fn close(&mut self);
}

/// SMTP through lettre
pub struct SmtpMailer;

struct SmtpSession {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

#[async_trait::async_trait]
impl MailTransport for SmtpMailer {
    async fn open(&self, smtp: &SmtpSettings) -> Result<Box<dyn MailSession>, DeliveryError> {
        let mut builder = if smtp.tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp.host)
        };
        if let Some(port) = smtp.port {
            builder = builder.port(port);
        }
        if let (Some(username), Some(password)) = (&smtp.username, &smtp.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Box::new(SmtpSession { transport: builder.build() }))
    }
}

#[async_trait::async_trait]
impl MailSession for SmtpSession {
    async fn send(&mut self, mail: &OutgoingMail) -> Result<String, DeliveryError> {
        let mut builder = Message::builder()
            .from(mail.from.parse::<Mailbox>()?)
            .subject(mail.subject.clone())
            .header(ContentType::TEXT_PLAIN);
        for to in &mail.to {
            builder = builder.to(to.parse::<Mailbox>()?);
        }
        let message = builder.body(mail.body.clone())?;

        let response = self.transport.send(message).await?;
        let text: Vec<&str> = response.message().collect();
        Ok(format!("{} {}", response.code(), text.join(" ")))
    }

    async fn close(&mut self) {
        // Without pooling, lettre quits the SMTP connection after each send.
        tracing::trace!("SMTP session closed");
    }
}

/// Email notify channel
pub struct EmailChannel {
    name: String,
    config: EmailConfig,
    transport: Arc<dyn MailTransport>,
}

impl EmailChannel {
    pub fn new(name: String, config: EmailConfig, transport: Arc<dyn MailTransport>) -> Self {
        Self { name, config, transport }
    }

    fn compose(&self, event: &TransitionEvent) -> OutgoingMail {
        OutgoingMail {
            from: self.config.from.clone(),
            to: self.config.to.to_vec(),
            subject: email_subject(&self.config.sub, event),
            body: email_body(event, &self.config.footer),
        }
    }

    /// Send one message for `event`. The session is closed whatever happens.
    pub async fn deliver(&self, event: &TransitionEvent) {
        tracing::debug!(target: "stwatch::notify", "Sending email notification {}", self.name);

        let mut session = match self.transport.open(&self.config.smtp).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(target: "stwatch::notify", "{}: could not open mail session: {}", self.name, e);
                return;
            }
        };

        match session.send(&self.compose(event)).await {
            Ok(receipt) => {
                tracing::info!(target: "stwatch::notify", "Sent: {} - {} {}", self.name, receipt, event.message)
            }
            Err(e) => tracing::error!(target: "stwatch::notify", "{}: email failed: {}", self.name, e),
        }

        session.close().await;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::OneOrMany;
    use chrono::Utc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records every mail; fails sending when `fail` is set
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Arc<Mutex<Vec<OutgoingMail>>>,
        pub closed: Arc<AtomicUsize>,
        pub fail: bool,
    }

    struct RecordingSession {
        sent: Arc<Mutex<Vec<OutgoingMail>>>,
        closed: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl MailTransport for RecordingMailer {
        async fn open(&self, _smtp: &SmtpSettings) -> Result<Box<dyn MailSession>, DeliveryError> {
            Ok(Box::new(RecordingSession {
                sent: self.sent.clone(),
                closed: self.closed.clone(),
                fail: self.fail,
            }))
        }
    }

    #[async_trait::async_trait]
    impl MailSession for RecordingSession {
        async fn send(&mut self, mail: &OutgoingMail) -> Result<String, DeliveryError> {
            if self.fail {
                return Err(DeliveryError::Rejected("550 mailbox unavailable".into()));
            }
            self.sent.lock().unwrap().push(mail.clone());
            Ok("250 OK".into())
        }

        async fn close(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn email_config() -> EmailConfig {
        EmailConfig {
            from: "watcher@example.org".into(),
            to: OneOrMany::Many(vec!["ops@example.org".into(), "dev@example.org".into()]),
            sub: "[st]".into(),
            footer: "-- sent by stwatch".into(),
            smtp: SmtpSettings {
                host: "smtp.example.org".into(),
                port: None,
                username: None,
                password: None,
                tls: true,
            },
        }
    }

    #[tokio::test]
    async fn test_delivers_one_message_to_all_recipients() {
        let mailer = Arc::new(RecordingMailer::default());
        let channel = EmailChannel::new("mail".into(), email_config(), mailer.clone());

        channel.deliver(&TransitionEvent::up("st", Utc::now())).await;

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, vec!["ops@example.org", "dev@example.org"]);
        assert_eq!(sent[0].subject, "[st] SurveyTool st UP");
        assert!(sent[0].body.ends_with("-- sent by stwatch\n"));
        assert_eq!(mailer.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_session_closed_after_failure() {
        let mailer = Arc::new(RecordingMailer { fail: true, ..Default::default() });
        let channel = EmailChannel::new("mail".into(), email_config(), mailer.clone());

        channel.deliver(&TransitionEvent::up("st", Utc::now())).await;

        assert!(mailer.sent.lock().unwrap().is_empty());
        assert_eq!(mailer.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_smtp_rejects_bad_address_before_connecting() {
        let mut session = SmtpMailer.open(&email_config().smtp).await.unwrap();
        let mail = OutgoingMail {
            from: "not an address".into(),
            to: vec!["ops@example.org".into()],
            subject: "x".into(),
            body: "y".into(),
        };

        assert!(matches!(session.send(&mail).await, Err(DeliveryError::Address(_))));
    }
}

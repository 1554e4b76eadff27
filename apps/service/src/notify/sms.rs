use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;

use super::DeliveryError;
use super::message::compose;
use crate::config::{SmsAccount, SmsConfig};
use crate::events::TransitionEvent;

/// Builds an SMS client from account credentials
#[async_trait::async_trait]
pub trait SmsProvider: Send + Sync {
    async fn client(&self, account: &SmsAccount) -> Result<Arc<dyn SmsClient>, DeliveryError>;
}

#[async_trait::async_trait]
pub trait SmsClient: Send + Sync {
    /// Send one text and return the provider's message id
    async fn send(&self, from: &str, to: &str, body: &str) -> Result<String, DeliveryError>;
}

/// Twilio REST API
pub struct TwilioProvider {
    base_url: String,
}

impl Default for TwilioProvider {
    fn default() -> Self {
        Self::new("https://api.twilio.com")
    }
}

impl TwilioProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into().trim_end_matches('/').to_string() }
    }
}

struct TwilioClient {
    http: reqwest::Client,
    messages_url: String,
    account_sid: String,
    auth_token: String,
}

#[async_trait::async_trait]
impl SmsProvider for TwilioProvider {
    async fn client(&self, account: &SmsAccount) -> Result<Arc<dyn SmsClient>, DeliveryError> {
        let http = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Arc::new(TwilioClient {
            http,
            messages_url: format!("{}/2010-04-01/Accounts/{}/Messages.json", self.base_url, account.account_sid),
            account_sid: account.account_sid.clone(),
            auth_token: account.auth_token.clone(),
        }))
    }
}

#[async_trait::async_trait]
impl SmsClient for TwilioClient {
    async fn send(&self, from: &str, to: &str, body: &str) -> Result<String, DeliveryError> {
        let response = self
            .http
            .post(&self.messages_url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("From", from), ("To", to), ("Body", body)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Sms(format!("{status}: {text}")));
        }

        let json: serde_json::Value = response.json().await?;
        Ok(json.get("sid").and_then(|s| s.as_str()).unwrap_or("?").to_string())
    }
}

/// SMS notify channel; the client is created on first use
pub struct SmsChannel {
    name: String,
    config: SmsConfig,
    provider: Arc<dyn SmsProvider>,
    client: OnceCell<Arc<dyn SmsClient>>,
}

impl SmsChannel {
    pub fn new(name: String, config: SmsConfig, provider: Arc<dyn SmsProvider>) -> Self {
        Self { name, config, provider, client: OnceCell::new() }
    }

    async fn client(&self) -> Result<&Arc<dyn SmsClient>, DeliveryError> {
        self.client
            .get_or_try_init(|| async {
                let client = self.provider.client(&self.config.account).await?;
                tracing::info!(target: "stwatch::notify", "{}: sms account set up to send from {}", self.name, self.config.from);
                Ok::<_, DeliveryError>(client)
            })
            .await
    }

    /// Text every recipient. One failed recipient does not stop the rest.
    pub async fn deliver(&self, event: &TransitionEvent) {
        let client = match self.client().await {
            Ok(client) => client,
            Err(e) => {
                tracing::error!(target: "stwatch::notify", "{}: sms setup failed: {}", self.name, e);
                return;
            }
        };

        let body = compose(event);
        for to in self.config.to.to_vec() {
            match client.send(&self.config.from, &to, &body).await {
                Ok(id) => tracing::info!(target: "stwatch::notify", "Sent: {} to {} ({})", self.name, to, id),
                Err(e) => tracing::error!(target: "stwatch::notify", "{}: sms to {} failed: {}", self.name, to, e),
            }
        }
    }
}

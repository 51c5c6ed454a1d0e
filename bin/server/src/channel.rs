//! Outbound replies over the SMS gateway.

use crate::config::TwilioConfig;
use crate::error::ChannelError;
use async_trait::async_trait;
use recall_core::{AgentAddress, UserAddress};
use reqwest::Client;
use tracing::{debug, instrument};

/// Default Twilio REST base URL.
pub const DEFAULT_TWILIO_URL: &str = "https://api.twilio.com";

/// Sends a text reply to a user.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Sends `body` to `to`, from the agent's address.
    async fn send(&self, from: &AgentAddress, to: &UserAddress, body: &str)
    -> Result<(), ChannelError>;
}

/// Sends messages through the Twilio Messages API.
pub struct TwilioSender {
    http: Client,
    account_sid: String,
    auth_token: String,
    base_url: String,
}

impl TwilioSender {
    /// Creates a sender from configuration.
    #[must_use]
    pub fn new(http: Client, config: &TwilioConfig) -> Self {
        Self {
            http,
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ChannelSender for TwilioSender {
    #[instrument(skip(self, body), fields(from = %from, to = %to))]
    async fn send(
        &self,
        from: &AgentAddress,
        to: &UserAddress,
        body: &str,
    ) -> Result<(), ChannelError> {
        let response = self
            .http
            .post(format!(
                "{}/2010-04-01/Accounts/{}/Messages.json",
                self.base_url, self.account_sid
            ))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to.as_str()), ("From", from.as_str()), ("Body", body)])
            .send()
            .await
            .map_err(|e| ChannelError::Transport {
                details: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(ChannelError::Rejected {
                status: status.as_u16(),
                details,
            });
        }

        debug!("reply sent");
        Ok(())
    }
}

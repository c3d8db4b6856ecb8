use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use tracing::{error, info};

use crate::config::{GraphMailConfig, SettingsOverrides};
use crate::error::MailError;
use crate::message::OutgoingMessage;
use crate::registry::DeliveryMethod;
use crate::token::TokenManager;

pub mod payload;
pub mod response;

pub use payload::{build_send_mail_request, SendMailRequest};
pub use response::{classify_response, error_detail};

pub const DELIVERY_METHOD_NAME: &str = "msgraph";
const SEND_REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(60);

/// Sends messages through the Graph `sendMail` endpoint of one mailbox.
#[derive(Debug, Clone)]
pub struct GraphDelivery {
    client: Client,
    config: GraphMailConfig,
    tokens: Arc<TokenManager>,
}

impl GraphDelivery {
    /// Sends over the token manager's client, which carries the connect timeout.
    pub fn new(config: GraphMailConfig, tokens: Arc<TokenManager>) -> Self {
        let client = tokens.client().clone();
        Self::with_client(client, config, tokens)
    }

    pub fn with_client(client: Client, config: GraphMailConfig, tokens: Arc<TokenManager>) -> Self {
        Self {
            client,
            config,
            tokens,
        }
    }

    pub fn config(&self) -> &GraphMailConfig {
        &self.config
    }

    /// Sends `message` with `overrides` layered over the base configuration.
    ///
    /// A 401 from Graph evicts the cached token before the error is returned;
    /// the send itself is not retried.
    pub async fn deliver(
        &self,
        message: &OutgoingMessage,
        overrides: &SettingsOverrides,
    ) -> Result<(), MailError> {
        let config = self.config.merged(overrides);
        match self.deliver_with(&config, message).await {
            Ok(()) => {
                info!(
                    "msgraph: sent email to {} from {}",
                    message.recipient_summary(),
                    config.sender_email
                );
                Ok(())
            }
            Err(failure) => {
                error!("msgraph: delivery failed: {failure}");
                Err(failure)
            }
        }
    }

    async fn deliver_with(
        &self,
        config: &GraphMailConfig,
        message: &OutgoingMessage,
    ) -> Result<(), MailError> {
        let missing = config.missing_fields();
        if !missing.is_empty() {
            return Err(MailError::missing(missing));
        }

        let access_token = self.tokens.access_token(config).await?;
        let request = build_send_mail_request(message, config);
        let (status, body) = self.send(config, &access_token, &request).await?;

        if status == StatusCode::UNAUTHORIZED {
            self.tokens.invalidate(config).await;
        }
        classify_response(status, &body)
    }

    async fn send(
        &self,
        config: &GraphMailConfig,
        access_token: &str,
        request: &SendMailRequest,
    ) -> Result<(StatusCode, String), MailError> {
        let url = config.endpoints.send_mail_url(&config.sender_email);
        let body = serde_json::to_vec(request)
            .map_err(|error| MailError::Payload(format!("encode sendMail payload: {error}")))?;

        let response = self
            .client
            .post(&url)
            .timeout(SEND_REQUEST_TIMEOUT)
            .bearer_auth(access_token)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|error| MailError::Transport(format!("POST {url}: {error}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|error| MailError::Transport(format!("read sendMail response: {error}")))?;
        Ok((status, text))
    }
}

#[async_trait]
impl DeliveryMethod for GraphDelivery {
    fn name(&self) -> &str {
        DELIVERY_METHOD_NAME
    }

    fn is_configured(&self) -> bool {
        self.config.is_valid()
    }

    async fn deliver(
        &self,
        message: &OutgoingMessage,
        overrides: &SettingsOverrides,
    ) -> Result<(), MailError> {
        GraphDelivery::deliver(self, message, overrides).await
    }
}

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::GraphMailConfig;
use crate::error::MailError;
use crate::token::TokenManager;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub success: bool,
    pub error: Option<String>,
}

impl ProbeResult {
    fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    fn failed(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(detail.into()),
        }
    }
}

/// Checks that credentials can obtain a token. Never sends mail.
#[derive(Debug, Clone)]
pub struct ConnectionProbe {
    tokens: Arc<TokenManager>,
}

impl ConnectionProbe {
    pub fn new(tokens: Arc<TokenManager>) -> Self {
        Self { tokens }
    }

    pub async fn probe(&self, config: &GraphMailConfig) -> ProbeResult {
        let missing = config.missing_fields();
        if !missing.is_empty() {
            return ProbeResult::failed(MailError::missing(missing).to_string());
        }

        match self.tokens.access_token(config).await {
            Ok(token) if !token.is_empty() => {
                info!("msgraph: connection probe succeeded for tenant {}", config.tenant_id);
                ProbeResult::ok()
            }
            Ok(_) => ProbeResult::failed("failed to obtain access token"),
            Err(error) => {
                warn!("msgraph: connection probe failed: {error}");
                ProbeResult::failed(error.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::ConnectionProbe;
    use crate::config::{Endpoints, GraphMailConfig};
    use crate::token::TokenManager;

    fn config(server: &MockServer) -> GraphMailConfig {
        GraphMailConfig {
            tenant_id: "tenant-a".to_string(),
            client_id: "client-a".to_string(),
            client_secret: "secret-a".to_string(),
            sender_email: "noreply@example.com".to_string(),
            endpoints: Endpoints {
                login_base: server.uri(),
                graph_base: server.uri(),
            },
            ..GraphMailConfig::default()
        }
    }

    #[tokio::test]
    async fn probe_succeeds_when_a_token_is_issued() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "tok", "expires_in": 3600})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let probe = ConnectionProbe::new(Arc::new(TokenManager::new().expect("build token manager")));
        let result = probe.probe(&config(&server)).await;
        assert!(result.success);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn probe_reports_provider_detail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "invalid_client",
                "error_description": "AADSTS7000215: Invalid client secret provided."
            })))
            .mount(&server)
            .await;

        let probe = ConnectionProbe::new(Arc::new(TokenManager::new().expect("build token manager")));
        let result = probe.probe(&config(&server)).await;
        assert!(!result.success);
        assert!(result
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("AADSTS7000215"));
    }

    #[tokio::test]
    async fn probe_rejects_incomplete_configuration_without_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let mut config = config(&server);
        config.tenant_id.clear();
        let probe = ConnectionProbe::new(Arc::new(TokenManager::new().expect("build token manager")));
        let result = probe.probe(&config).await;
        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("missing configuration: tenant_id")
        );
    }
}

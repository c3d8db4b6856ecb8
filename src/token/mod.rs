use std::collections::HashMap;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::GraphMailConfig;
use crate::error::MailError;

pub const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";
/// Tokens this close to expiry are treated as expired.
pub const EXPIRY_BUFFER_SECONDS: i64 = 300;
const CONNECT_TIMEOUT: StdDuration = StdDuration::from_secs(10);
const TOKEN_REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(30);

#[derive(Debug, Clone, Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    #[allow(dead_code)]
    token_type: Option<String>,
    #[serde(deserialize_with = "deserialize_seconds")]
    expires_in: u64,
}

/// Some token endpoints send `expires_in` as a numeric string.
fn deserialize_seconds<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(u64),
        Text(String),
    }

    match Seconds::deserialize(deserializer)? {
        Seconds::Number(value) => Ok(value),
        Seconds::Text(raw) => raw
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid expires_in '{raw}'"))),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct OAuthErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedAccessToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedAccessToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at - Duration::seconds(EXPIRY_BUFFER_SECONDS)
    }
}

/// Client-credentials token cache shared by every sender.
///
/// Entries are keyed by tenant and client id, so several app registrations
/// can send through one manager without seeing each other's tokens. A single
/// lock covers lookup and fetch: callers racing on a cold key wait for the
/// first exchange instead of issuing their own.
#[derive(Debug)]
pub struct TokenManager {
    client: Client,
    cache: Mutex<HashMap<CacheKey, CachedAccessToken>>,
}

/// Tenant id and client id of one app registration.
pub type CacheKey = (String, String);

impl TokenManager {
    pub fn new() -> Result<Self, MailError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|error| MailError::Transport(format!("build HTTP client: {error}")))?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The HTTP client, shared with senders built on this manager.
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn cache_key(config: &GraphMailConfig) -> CacheKey {
        (
            config.tenant_id.trim().to_string(),
            config.client_id.trim().to_string(),
        )
    }

    /// Returns a bearer token for `config`, fetching a new one when the cached
    /// entry is missing or inside the expiry buffer.
    pub async fn access_token(&self, config: &GraphMailConfig) -> Result<String, MailError> {
        let key = Self::cache_key(config);
        let mut cache = self.cache.lock().await;

        if let Some(cached) = cache.get(&key) {
            if cached.is_fresh(Utc::now()) {
                debug!("msgraph: using cached token for tenant {} client {}", key.0, key.1);
                return Ok(cached.access_token.clone());
            }
        }

        let missing = config.missing_credentials();
        if !missing.is_empty() {
            return Err(MailError::missing(missing));
        }

        info!(
            "msgraph: fetching new access token for tenant {} client {}",
            key.0, key.1
        );
        let fresh = self.fetch_token(config).await?;
        let token = fresh.access_token.clone();
        cache.insert(key, fresh);
        Ok(token)
    }

    /// Drops the cached token for one tenant/client pair.
    pub async fn invalidate(&self, config: &GraphMailConfig) {
        let key = Self::cache_key(config);
        if self.cache.lock().await.remove(&key).is_some() {
            info!(
                "msgraph: invalidated cached token for tenant {} client {}",
                key.0, key.1
            );
        }
    }

    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
    }

    pub async fn cached_entries(&self) -> usize {
        self.cache.lock().await.len()
    }

    async fn fetch_token(&self, config: &GraphMailConfig) -> Result<CachedAccessToken, MailError> {
        let token_url = config.endpoints.token_url(config.tenant_id.trim());

        let response = self
            .client
            .post(&token_url)
            .timeout(TOKEN_REQUEST_TIMEOUT)
            .form(&[
                ("client_id", config.client_id.trim()),
                ("client_secret", config.client_secret.as_str()),
                ("scope", GRAPH_SCOPE),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .map_err(|error| {
                MailError::Token(format!("request token from {token_url}: {error}"))
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| MailError::Token(format!("read token response: {error}")))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<OAuthErrorResponse>(&body)
                .ok()
                .and_then(|parsed| parsed.error_description.or(parsed.error))
                .filter(|detail| !detail.trim().is_empty())
                .unwrap_or_else(|| "unknown error".to_string());
            warn!("msgraph: token request failed with status {status}");
            return Err(MailError::Token(format!(
                "token request failed ({status}): {detail}"
            )));
        }

        let payload: OAuthTokenResponse = serde_json::from_str(&body)
            .map_err(|error| MailError::Token(format!("decode token response: {error}")))?;
        if payload.access_token.trim().is_empty() {
            return Err(MailError::Token(
                "token endpoint returned an empty access token".to_string(),
            ));
        }

        let expires_in = i64::try_from(payload.expires_in).unwrap_or(i64::MAX);
        Ok(CachedAccessToken {
            access_token: payload.access_token,
            expires_at: Utc::now() + Duration::seconds(expires_in.min(i64::from(u32::MAX))),
        })
    }

    #[cfg(test)]
    async fn seed(&self, config: &GraphMailConfig, token: &str, expires_at: DateTime<Utc>) {
        self.cache.lock().await.insert(
            Self::cache_key(config),
            CachedAccessToken {
                access_token: token.to_string(),
                expires_at,
            },
        );
    }
}

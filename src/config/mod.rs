use std::fmt::{Debug, Formatter};

use serde::{Deserialize, Serialize};

pub const DEFAULT_LOGIN_BASE: &str = "https://login.microsoftonline.com";
pub const DEFAULT_GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";

pub const TENANT_ID_ENV: &str = "MSGRAPH_TENANT_ID";
pub const CLIENT_ID_ENV: &str = "MSGRAPH_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "MSGRAPH_CLIENT_SECRET";
pub const SENDER_EMAIL_ENV: &str = "MSGRAPH_SENDER_EMAIL";
pub const SENDER_NAME_ENV: &str = "MSGRAPH_SENDER_NAME";
pub const SAVE_TO_SENT_ITEMS_ENV: &str = "MSGRAPH_SAVE_TO_SENT_ITEMS";
pub const LOGIN_BASE_ENV: &str = "MSGRAPH_LOGIN_BASE";
pub const GRAPH_BASE_ENV: &str = "MSGRAPH_API_BASE";

/// Base URLs for the identity platform and the Graph API.
///
/// Kept separate from credentials so national clouds and local test servers
/// can be targeted without touching the request-building code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    pub login_base: String,
    pub graph_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login_base: DEFAULT_LOGIN_BASE.to_string(),
            graph_base: DEFAULT_GRAPH_BASE.to_string(),
        }
    }
}

impl Endpoints {
    pub fn token_url(&self, tenant_id: &str) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.login_base.trim_end_matches('/'),
            tenant_id
        )
    }

    pub fn send_mail_url(&self, sender_email: &str) -> String {
        format!(
            "{}/users/{}/sendMail",
            self.graph_base.trim_end_matches('/'),
            urlencoding::encode(sender_email)
        )
    }
}

/// Credentials and sender identity for one Graph mailbox.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphMailConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub sender_email: String,
    pub sender_name: Option<String>,
    pub save_to_sent_items: bool,
    #[serde(default)]
    pub endpoints: Endpoints,
}

impl Default for GraphMailConfig {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            sender_email: String::new(),
            sender_name: None,
            save_to_sent_items: true,
            endpoints: Endpoints::default(),
        }
    }
}

impl Debug for GraphMailConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let secret = if self.client_secret.trim().is_empty() {
            "<unset>"
        } else {
            "<redacted>"
        };
        f.debug_struct("GraphMailConfig")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &secret)
            .field("sender_email", &self.sender_email)
            .field("sender_name", &self.sender_name)
            .field("save_to_sent_items", &self.save_to_sent_items)
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

impl GraphMailConfig {
    /// Reads the `MSGRAPH_*` variables. Blank values count as unset.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let defaults = Endpoints::default();
        Self {
            tenant_id: value(TENANT_ID_ENV).unwrap_or_default(),
            client_id: value(CLIENT_ID_ENV).unwrap_or_default(),
            client_secret: value(CLIENT_SECRET_ENV).unwrap_or_default(),
            sender_email: value(SENDER_EMAIL_ENV).unwrap_or_default(),
            sender_name: value(SENDER_NAME_ENV),
            save_to_sent_items: value(SAVE_TO_SENT_ITEMS_ENV)
                .map(|raw| raw == "true")
                .unwrap_or(true),
            endpoints: Endpoints {
                login_base: value(LOGIN_BASE_ENV).unwrap_or(defaults.login_base),
                graph_base: value(GRAPH_BASE_ENV).unwrap_or(defaults.graph_base),
            },
        }
    }

    pub fn is_valid(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Required fields that are blank, in declaration order.
    pub fn missing_fields(&self) -> Vec<String> {
        let mut missing = self.missing_credentials();
        if self.sender_email.trim().is_empty() {
            missing.push("sender_email".to_string());
        }
        missing
    }

    /// The subset of required fields a token exchange needs.
    pub fn missing_credentials(&self) -> Vec<String> {
        [
            ("tenant_id", &self.tenant_id),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name.to_string())
        .collect()
    }

    /// Returns a copy with every non-blank override applied.
    pub fn merged(&self, overrides: &SettingsOverrides) -> Self {
        let mut merged = self.clone();
        let apply = |target: &mut String, value: &Option<String>| {
            if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                *target = value.to_string();
            }
        };

        apply(&mut merged.tenant_id, &overrides.tenant_id);
        apply(&mut merged.client_id, &overrides.client_id);
        apply(&mut merged.client_secret, &overrides.client_secret);
        apply(&mut merged.sender_email, &overrides.sender_email);
        if let Some(name) = overrides
            .sender_name
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            merged.sender_name = Some(name.to_string());
        }
        if let Some(save) = overrides.save_to_sent_items {
            merged.save_to_sent_items = save;
        }
        merged
    }
}

/// Per-send settings layered over a base [`GraphMailConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsOverrides {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub sender_email: Option<String>,
    pub sender_name: Option<String>,
    pub save_to_sent_items: Option<bool>,
}

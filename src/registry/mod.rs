use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::config::SettingsOverrides;
use crate::error::MailError;
use crate::message::OutgoingMessage;

/// A named way of delivering outgoing mail that a host can select at runtime.
#[async_trait]
pub trait DeliveryMethod: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the method has everything it needs to send.
    fn is_configured(&self) -> bool;

    async fn deliver(
        &self,
        message: &OutgoingMessage,
        overrides: &SettingsOverrides,
    ) -> Result<(), MailError>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown delivery method: {0}")]
    UnknownMethod(String),

    #[error("delivery method {0} is not configured")]
    NotConfigured(String),
}

/// Host mailer settings as seen after a reload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailerSettings {
    pub delivery_method: Option<String>,
}

/// Delivery methods known to the host plus the one currently selected.
///
/// Hosts call [`DeliveryMethodRegistry::reload`] whenever their mailer
/// settings change instead of patching their own reload routine.
pub struct DeliveryMethodRegistry {
    methods: Vec<Box<dyn DeliveryMethod>>,
    active: Option<usize>,
}

impl DeliveryMethodRegistry {
    pub fn new() -> Self {
        Self {
            methods: Vec::new(),
            active: None,
        }
    }

    pub fn register(&mut self, method: Box<dyn DeliveryMethod>) {
        let name = method.name().to_string();
        match self.position(&name) {
            Some(index) => self.methods[index] = method,
            None => self.methods.push(method),
        }
    }

    pub fn by_name(&self, name: &str) -> Option<&dyn DeliveryMethod> {
        self.position(name)
            .map(|index| self.methods[index].as_ref())
    }

    pub fn all(&self) -> &[Box<dyn DeliveryMethod>] {
        &self.methods
    }

    pub fn active(&self) -> Option<&dyn DeliveryMethod> {
        self.active.map(|index| self.methods[index].as_ref())
    }

    /// Selects `name`; refused when the method is unknown or unconfigured,
    /// in which case the previous selection stays in place.
    pub fn activate(&mut self, name: &str) -> Result<(), RegistryError> {
        let index = self
            .position(name)
            .ok_or_else(|| RegistryError::UnknownMethod(name.to_string()))?;
        let method = &self.methods[index];
        if !method.is_configured() {
            return Err(RegistryError::NotConfigured(method.name().to_string()));
        }
        info!("mailer: activated delivery method {}", method.name());
        self.active = Some(index);
        Ok(())
    }

    pub fn deactivate(&mut self) {
        if let Some(method) = self.active() {
            info!("mailer: deactivated delivery method {}", method.name());
        }
        self.active = None;
    }

    /// Post-reload hook. Activates the selected method when it is one of
    /// ours, otherwise clears the selection so the host's own method applies.
    pub fn reload(&mut self, settings: &MailerSettings) -> Result<Option<&str>, RegistryError> {
        let selected = settings
            .delivery_method
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty());

        match selected {
            Some(name) if self.position(name).is_some() => {
                self.activate(name)?;
                Ok(self.active().map(|method| method.name()))
            }
            _ => {
                self.active = None;
                Ok(None)
            }
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.methods
            .iter()
            .position(|method| method.name().eq_ignore_ascii_case(name))
    }
}

impl Default for DeliveryMethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

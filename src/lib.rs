pub mod config;
pub mod delivery;
pub mod error;
pub mod message;
pub mod probe;
pub mod registry;
pub mod token;

pub use config::{Endpoints, GraphMailConfig, SettingsOverrides};
pub use delivery::GraphDelivery;
pub use error::{ErrorKind, MailError};
pub use message::{Attachment, Mailbox, OutgoingMessage};
pub use probe::{ConnectionProbe, ProbeResult};
pub use registry::{DeliveryMethod, DeliveryMethodRegistry, MailerSettings};
pub use token::TokenManager;

use thiserror::Error;

/// Coarse classification of a [`MailError`], for callers that branch on the
/// failure category rather than the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    Token,
    Authentication,
    Permission,
    InvalidRequest,
    UnexpectedResponse,
    Transport,
    Payload,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("missing configuration: {}", missing.join(", "))]
    Configuration { missing: Vec<String> },

    #[error("failed to obtain access token: {0}")]
    Token(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("permission denied, ensure Mail.Send is granted: {0}")]
    Permission(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unexpected response {status}: {detail}")]
    UnexpectedResponse { status: u16, detail: String },

    #[error("transport: {0}")]
    Transport(String),

    #[error("payload: {0}")]
    Payload(String),
}

impl MailError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Token(_) => ErrorKind::Token,
            Self::Authentication(_) => ErrorKind::Authentication,
            Self::Permission(_) => ErrorKind::Permission,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::UnexpectedResponse { .. } => ErrorKind::UnexpectedResponse,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Payload(_) => ErrorKind::Payload,
        }
    }

    pub(crate) fn missing(fields: Vec<String>) -> Self {
        Self::Configuration { missing: fields }
    }
}

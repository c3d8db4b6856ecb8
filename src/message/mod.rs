//! In-memory representation of a message handed to the mailer.
//!
//! The delivery adapter only reads these types; building them from a host
//! framework's mail object is the caller's job. [`MessageFile`] is the JSON
//! shape the command-line front end accepts.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mailbox {
    pub address: String,
    pub name: Option<String>,
}

impl Mailbox {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
        }
    }

    pub fn named(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: Some(name.into()),
        }
    }

    /// Parses `addr@example.com` or `Display Name <addr@example.com>`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        if let (Some(start), Some(end)) = (raw.rfind('<'), raw.rfind('>')) {
            if start < end {
                let address = raw[start + 1..end].trim();
                if address.is_empty() {
                    return None;
                }
                let name = raw[..start].trim().trim_matches('"').trim();
                return Some(Self {
                    address: address.to_string(),
                    name: (!name.is_empty()).then(|| name.to_string()),
                });
            }
        }

        raw.contains('@').then(|| Self::new(raw))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub subject: Option<String>,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    /// Single-part body whose type is only known from `content_type`.
    pub raw_body: Option<String>,
    pub content_type: Option<String>,
    pub to: Vec<Mailbox>,
    pub cc: Vec<Mailbox>,
    pub bcc: Vec<Mailbox>,
    pub reply_to: Vec<Mailbox>,
    pub attachments: Vec<Attachment>,
}

impl OutgoingMessage {
    /// Small plain-text message used to confirm a mailbox can send.
    pub fn test_message(recipient: Mailbox) -> Self {
        Self {
            subject: Some("Microsoft Graph mail test".to_string()),
            text_body: Some(
                "This is a test email sent through the Microsoft Graph sendMail API.\n\
                 If you can read this, delivery is configured correctly."
                    .to_string(),
            ),
            to: vec![recipient],
            ..Self::default()
        }
    }

    pub fn recipient_summary(&self) -> String {
        self.to
            .iter()
            .map(|mailbox| mailbox.address.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// JSON message description read by the CLI. Attachment paths are resolved
/// relative to the file's directory.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageFile {
    pub subject: Option<String>,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub raw_body: Option<String>,
    pub content_type: Option<String>,
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    #[serde(default)]
    pub reply_to: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentFile {
    pub path: PathBuf,
    pub filename: Option<String>,
    pub mime_type: Option<String>,
}

impl MessageFile {
    pub fn load(path: &Path) -> Result<OutgoingMessage> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read message file {}", path.display()))?;
        let parsed: MessageFile = serde_json::from_str(&raw)
            .with_context(|| format!("decode message JSON {}", path.display()))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        parsed.into_message(base_dir)
    }

    pub fn into_message(self, base_dir: &Path) -> Result<OutgoingMessage> {
        let attachments = self
            .attachments
            .into_iter()
            .map(|attachment| attachment.load(base_dir))
            .collect::<Result<Vec<_>>>()?;

        Ok(OutgoingMessage {
            subject: self.subject,
            html_body: self.html_body,
            text_body: self.text_body,
            raw_body: self.raw_body,
            content_type: self.content_type,
            to: parse_mailboxes("to", &self.to)?,
            cc: parse_mailboxes("cc", &self.cc)?,
            bcc: parse_mailboxes("bcc", &self.bcc)?,
            reply_to: parse_mailboxes("reply_to", &self.reply_to)?,
            attachments,
        })
    }
}

impl AttachmentFile {
    fn load(self, base_dir: &Path) -> Result<Attachment> {
        let full_path = if self.path.is_absolute() {
            self.path.clone()
        } else {
            base_dir.join(&self.path)
        };
        let bytes = std::fs::read(&full_path)
            .with_context(|| format!("read attachment {}", full_path.display()))?;
        let filename = match self.filename {
            Some(name) => name,
            None => full_path
                .file_name()
                .and_then(|name| name.to_str())
                .map(str::to_string)
                .ok_or_else(|| anyhow!("attachment path has no file name: {}", full_path.display()))?,
        };
        let mime_type = self
            .mime_type
            .unwrap_or_else(|| guess_mime_type(&filename).to_string());

        Ok(Attachment {
            filename,
            mime_type,
            bytes,
        })
    }
}

pub fn parse_mailboxes(field: &str, raw: &[String]) -> Result<Vec<Mailbox>> {
    raw.iter()
        .map(|entry| {
            Mailbox::parse(entry).ok_or_else(|| anyhow!("invalid {field} address '{entry}'"))
        })
        .collect()
}

fn guess_mime_type(filename: &str) -> &'static str {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "txt" | "log" => "text/plain",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "zip" => "application/zip",
        "ics" => "text/calendar",
        _ => "application/octet-stream",
    }
}

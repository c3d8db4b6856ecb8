use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;

use crate::config::GraphMailConfig;
use crate::message::{Attachment, Mailbox, OutgoingMessage};

const FILE_ATTACHMENT_TYPE: &str = "#microsoft.graph.fileAttachment";

/// Request body for `POST /users/{sender}/sendMail`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendMailRequest {
    pub message: GraphMessage,
    #[serde(rename = "saveToSentItems")]
    pub save_to_sent_items: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<GraphBody>,
    pub from: GraphRecipient,
    #[serde(rename = "toRecipients")]
    pub to_recipients: Vec<GraphRecipient>,
    #[serde(rename = "ccRecipients")]
    pub cc_recipients: Vec<GraphRecipient>,
    #[serde(rename = "bccRecipients")]
    pub bcc_recipients: Vec<GraphRecipient>,
    #[serde(rename = "replyTo")]
    pub reply_to: Vec<GraphRecipient>,
    pub attachments: Vec<GraphAttachment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BodyType {
    #[serde(rename = "HTML")]
    Html,
    #[serde(rename = "Text")]
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphBody {
    #[serde(rename = "contentType")]
    pub content_type: BodyType,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphRecipient {
    #[serde(rename = "emailAddress")]
    pub email_address: GraphEmailAddress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEmailAddress {
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphAttachment {
    #[serde(rename = "@odata.type")]
    pub odata_type: &'static str,
    pub name: String,
    pub content_type: String,
    pub content_bytes: String,
}

pub fn build_send_mail_request(
    message: &OutgoingMessage,
    config: &GraphMailConfig,
) -> SendMailRequest {
    SendMailRequest {
        message: GraphMessage {
            subject: message.subject.clone(),
            body: build_body(message),
            from: build_recipient(&config.sender_email, config.sender_name.as_deref()),
            to_recipients: build_recipients(&message.to),
            cc_recipients: build_recipients(&message.cc),
            bcc_recipients: build_recipients(&message.bcc),
            reply_to: build_recipients(&message.reply_to),
            attachments: message.attachments.iter().map(build_attachment).collect(),
        },
        save_to_sent_items: config.save_to_sent_items,
    }
}

/// HTML part wins over text; a single raw body is typed from the content type.
fn build_body(message: &OutgoingMessage) -> Option<GraphBody> {
    if let Some(html) = &message.html_body {
        return Some(GraphBody {
            content_type: BodyType::Html,
            content: html.clone(),
        });
    }

    if let Some(text) = &message.text_body {
        return Some(GraphBody {
            content_type: BodyType::Text,
            content: text.clone(),
        });
    }

    let raw = message
        .raw_body
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())?;
    let is_html = message
        .content_type
        .as_deref()
        .is_some_and(|kind| kind.to_ascii_lowercase().contains("html"));

    Some(GraphBody {
        content_type: if is_html { BodyType::Html } else { BodyType::Text },
        content: raw.to_string(),
    })
}

fn build_recipient(address: &str, name: Option<&str>) -> GraphRecipient {
    GraphRecipient {
        email_address: GraphEmailAddress {
            address: address.to_string(),
            name: name
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
        },
    }
}

fn build_recipients(mailboxes: &[Mailbox]) -> Vec<GraphRecipient> {
    mailboxes
        .iter()
        .map(|mailbox| build_recipient(&mailbox.address, mailbox.name.as_deref()))
        .collect()
}

fn build_attachment(attachment: &Attachment) -> GraphAttachment {
    GraphAttachment {
        odata_type: FILE_ATTACHMENT_TYPE,
        name: attachment.filename.clone(),
        content_type: attachment.mime_type.clone(),
        content_bytes: STANDARD.encode(&attachment.bytes),
    }
}

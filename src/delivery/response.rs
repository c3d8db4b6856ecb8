use reqwest::StatusCode;
use serde_json::Value;

use crate::error::MailError;

pub const ERROR_DETAIL_MAX_CHARS: usize = 500;

/// Maps a sendMail response onto success or a typed failure.
///
/// Token invalidation for 401 is left to the caller, which owns the cache.
pub fn classify_response(status: StatusCode, body: &str) -> Result<(), MailError> {
    if status.is_success() {
        return Ok(());
    }

    let detail = error_detail(body);
    Err(match status {
        StatusCode::UNAUTHORIZED => MailError::Authentication(detail),
        StatusCode::FORBIDDEN => MailError::Permission(detail),
        StatusCode::BAD_REQUEST => MailError::InvalidRequest(detail),
        other => MailError::UnexpectedResponse {
            status: other.as_u16(),
            detail,
        },
    })
}

/// `error.message`, then `error_description`, then the raw body; capped at
/// [`ERROR_DETAIL_MAX_CHARS`].
pub fn error_detail(body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let detail = parsed
        .as_ref()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(Value::as_str)
                .or_else(|| value.get("error_description").and_then(Value::as_str))
        })
        .unwrap_or(body);

    truncate_chars(detail.trim(), ERROR_DETAIL_MAX_CHARS)
}

/// Caps `value` at `max_chars` characters, the trailing "..." included.
fn truncate_chars(value: &str, max_chars: usize) -> String {
    const ELLIPSIS: &str = "...";
    if value.chars().count() <= max_chars {
        return value.to_string();
    }

    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let cut = value
        .char_indices()
        .nth(keep)
        .map(|(index, _)| index)
        .unwrap_or(value.len());
    format!("{}{ELLIPSIS}", &value[..cut])
}

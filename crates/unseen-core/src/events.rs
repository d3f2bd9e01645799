//! Event channel payloads.
//!
//! The push transport hands over raw JSON values; this module turns them into
//! typed [`ChannelEvent`]s. Anything malformed comes back as an [`EventError`]
//! so the caller can log and drop it.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::constants::kinds;
use crate::models::{Message, SenderInfo};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EventError {
    #[error("event has no type")]
    MissingType,
    #[error("unknown event type: {0}")]
    UnknownType(String),
    #[error("{kind} event is missing {field}")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },
    #[error("{kind} event has an invalid {field}")]
    InvalidField {
        kind: &'static str,
        field: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageCreated {
    pub conversation_id: String,
    pub message: Message,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreadUpdated {
    pub conversation_id: String,
    /// Staff member whose unread state this describes
    pub staff_id: Option<String>,
    pub total_unread: Option<u64>,
    pub unread_count: u32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDeleted {
    pub conversation_id: String,
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    MessageCreated(MessageCreated),
    UnreadUpdated(UnreadUpdated),
    MessageDeleted(MessageDeleted),
}

impl ChannelEvent {
    pub fn from_value(event: &Value) -> Result<Self, EventError> {
        let kind = event
            .get("type")
            .or_else(|| event.get("event"))
            .and_then(Value::as_str)
            .ok_or(EventError::MissingType)?;

        match kind {
            kinds::MESSAGE_CREATED => parse_message_created(event).map(ChannelEvent::MessageCreated),
            kinds::UNREAD_UPDATED => parse_unread_updated(event).map(ChannelEvent::UnreadUpdated),
            kinds::MESSAGE_DELETED => parse_message_deleted(event).map(ChannelEvent::MessageDeleted),
            other => Err(EventError::UnknownType(other.to_string())),
        }
    }

    pub fn conversation_id(&self) -> &str {
        match self {
            ChannelEvent::MessageCreated(e) => &e.conversation_id,
            ChannelEvent::UnreadUpdated(e) => &e.conversation_id,
            ChannelEvent::MessageDeleted(e) => &e.conversation_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ChannelEvent::MessageCreated(_) => kinds::MESSAGE_CREATED,
            ChannelEvent::UnreadUpdated(_) => kinds::UNREAD_UPDATED,
            ChannelEvent::MessageDeleted(_) => kinds::MESSAGE_DELETED,
        }
    }
}

fn parse_message_created(event: &Value) -> Result<MessageCreated, EventError> {
    const KIND: &str = kinds::MESSAGE_CREATED;
    let conversation_id = required_id(event, KIND, "conversation_id")?;
    let message = event.get("message").ok_or(EventError::MissingField {
        kind: KIND,
        field: "message",
    })?;

    let id = required_id(message, KIND, "message.id")?;
    let sender = SenderInfo::from_parts(
        optional_id(message, "sender_id"),
        message.get("sender_type").and_then(Value::as_str),
        message
            .get("sender_name")
            .and_then(Value::as_str)
            .map(str::to_string),
    );
    let body = message
        .get("body")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let created_at = match message.get("created_at") {
        Some(value) => parse_timestamp(value).ok_or(EventError::InvalidField {
            kind: KIND,
            field: "message.created_at",
        })?,
        None => {
            return Err(EventError::MissingField {
                kind: KIND,
                field: "message.created_at",
            })
        }
    };

    Ok(MessageCreated {
        conversation_id: conversation_id.clone(),
        message: Message {
            id,
            conversation_id,
            sender,
            body,
            created_at,
            is_deleted: false,
        },
    })
}

fn parse_unread_updated(event: &Value) -> Result<UnreadUpdated, EventError> {
    const KIND: &str = kinds::UNREAD_UPDATED;
    let conversation_id = required_id(event, KIND, "conversation_id")?;

    let unread_count = event
        .get("unread_count")
        .ok_or(EventError::MissingField {
            kind: KIND,
            field: "unread_count",
        })?
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or(EventError::InvalidField {
            kind: KIND,
            field: "unread_count",
        })?;

    let timestamp = event
        .get("timestamp")
        .ok_or(EventError::MissingField {
            kind: KIND,
            field: "timestamp",
        })
        .and_then(|value| {
            parse_timestamp(value).ok_or(EventError::InvalidField {
                kind: KIND,
                field: "timestamp",
            })
        })?;

    Ok(UnreadUpdated {
        conversation_id,
        staff_id: optional_id(event, "staff_id"),
        total_unread: event.get("total_unread").and_then(Value::as_u64),
        unread_count,
        timestamp,
    })
}

fn parse_message_deleted(event: &Value) -> Result<MessageDeleted, EventError> {
    const KIND: &str = kinds::MESSAGE_DELETED;
    Ok(MessageDeleted {
        conversation_id: required_id(event, KIND, "conversation_id")?,
        message_id: required_id(event, KIND, "message_id")?,
    })
}

/// Ids arrive as strings or as numbers depending on the backend version
fn optional_id(value: &Value, field: &str) -> Option<String> {
    match value.get(field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn required_id(value: &Value, kind: &'static str, field: &'static str) -> Result<String, EventError> {
    let key = field.rsplit('.').next().unwrap_or(field);
    optional_id(value, key).ok_or(EventError::MissingField { kind, field })
}

/// RFC 3339 strings, or unix time as a number (seconds, or milliseconds when
/// the value is too large to be seconds).
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => {
            let raw = n.as_i64()?;
            if raw.abs() >= 100_000_000_000 {
                Utc.timestamp_millis_opt(raw).single()
            } else {
                Utc.timestamp_opt(raw, 0).single()
            }
        }
        _ => None,
    }
}

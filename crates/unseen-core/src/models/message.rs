use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::sender::SenderInfo;

/// A chat message. Immutable once created except for the soft-delete flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender: SenderInfo,
    pub body: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_deleted: bool,
}

/// Denormalized pointer to the newest message of a conversation.
///
/// Snapshots carry a summary that may reference a message the store has not
/// loaded, so the id is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "LastMessageWire", into = "LastMessageWire")]
pub struct LastMessage {
    pub message_id: Option<String>,
    pub sender: SenderInfo,
    pub body: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl LastMessage {
    pub fn from_message(message: &Message) -> Self {
        Self {
            message_id: Some(message.id.clone()),
            sender: message.sender.clone(),
            body: message.body.clone(),
            created_at: Some(message.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LastMessageWire {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    sender_id: Option<String>,
    #[serde(default)]
    sender_type: Option<String>,
    #[serde(default)]
    sender_name: Option<String>,
    #[serde(default)]
    body: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl From<LastMessageWire> for LastMessage {
    fn from(wire: LastMessageWire) -> Self {
        Self {
            message_id: wire.id,
            sender: SenderInfo::from_parts(
                wire.sender_id,
                wire.sender_type.as_deref(),
                wire.sender_name,
            ),
            body: wire.body,
            created_at: wire.created_at,
        }
    }
}

impl From<LastMessage> for LastMessageWire {
    fn from(last: LastMessage) -> Self {
        let (sender_type, sender_name) = match &last.sender {
            SenderInfo::Staff { name, .. } => (Some("staff"), name.clone()),
            SenderInfo::Guest { name, .. } => (Some("guest"), name.clone()),
            SenderInfo::System => (Some("system"), None),
            SenderInfo::Unknown { name, .. } => (None, name.clone()),
        };
        Self {
            id: last.message_id,
            sender_id: last.sender.id().map(str::to_string),
            sender_type: sender_type.map(str::to_string),
            sender_name,
            body: last.body,
            created_at: last.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_last_message_from_flat_summary() {
        let last: LastMessage = serde_json::from_value(json!({
            "id": "m9",
            "sender_id": "g1",
            "sender_type": "guest",
            "sender_name": "Room 4",
            "body": "Towels please",
            "created_at": "2026-03-01T10:00:00Z"
        }))
        .unwrap();

        assert_eq!(last.message_id.as_deref(), Some("m9"));
        assert_eq!(last.sender.name(), Some("Room 4"));
        assert_eq!(last.body, "Towels please");
        assert!(last.created_at.is_some());
    }

    #[test]
    fn test_last_message_tolerates_sparse_summary() {
        let last: LastMessage = serde_json::from_value(json!({"body": "hi"})).unwrap();
        assert!(last.message_id.is_none());
        assert_eq!(last.sender, SenderInfo::Unknown { id: None, name: None });
    }

    #[test]
    fn test_untyped_sender_name_survives_wire_form() {
        let last: LastMessage = serde_json::from_value(json!({
            "sender_id": "g5",
            "sender_name": "Room 9",
            "body": "Checkout time?"
        }))
        .unwrap();
        assert_eq!(last.sender.name(), Some("Room 9"));

        let wire = LastMessageWire::from(last);
        assert_eq!(wire.sender_type, None);
        assert_eq!(wire.sender_name.as_deref(), Some("Room 9"));
    }
}

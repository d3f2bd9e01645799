use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which reconciliation pass produced an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationOrigin {
    /// A `message_created` from someone else was observed
    EventDerived,
    /// Synthesized from a positive unread count with no observed message
    FallbackDerived,
    /// Rebuilt from the first snapshot after a mount or reload
    Restored,
}

/// What caused an entry to be created or last refreshed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationTrigger {
    Message { message_id: String },
    UnreadCount { unread_count: u32 },
    Snapshot { requested_at: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEntry {
    pub conversation_id: String,
    /// Always at least 1
    pub count: u32,
    pub last_update: DateTime<Utc>,
    pub origin: NotificationOrigin,
    pub trigger: NotificationTrigger,
    pub label: String,
}

impl NotificationEntry {
    pub fn new(
        conversation_id: impl Into<String>,
        count: u32,
        origin: NotificationOrigin,
        trigger: NotificationTrigger,
        label: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            count: count.max(1),
            last_update: now,
            origin,
            trigger,
            label: label.into(),
        }
    }
}

/// Why an entry left the notification set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    /// Unread count reached zero (read here or elsewhere)
    Read,
    Dismissed,
    Opened,
    /// Conversation no longer exists in the store
    Missing,
}

/// Everything the notification surface renders, re-derived every tick
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationView {
    /// Most recently updated first
    pub entries: Vec<NotificationEntry>,
    pub total_unread: u64,
}

impl NotificationView {
    pub fn get(&self, conversation_id: &str) -> Option<&NotificationEntry> {
        self.entries.iter().find(|e| e.conversation_id == conversation_id)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

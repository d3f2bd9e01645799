use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::{LastMessage, Message};
use super::sender::Participant;

/// Where a conversation has been referenced from so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationSource {
    /// Only ever seen in fetched snapshots
    Snapshot,
    /// Referenced by at least one channel event
    Event,
}

#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: String,
    /// Message ids in arrival order (not necessarily creation order)
    pub message_ids: Vec<String>,
    messages: HashMap<String, Message>,
    /// Server-authoritative; may transiently disagree with the loaded messages
    pub unread_count: u32,
    /// Local instant the value in `unread_count` was written: event arrival,
    /// snapshot request or local read. Never moves backwards.
    pub unread_updated_at: Option<DateTime<Utc>>,
    /// Server timestamp of the last applied `unread_updated`. Only compared
    /// against other server timestamps.
    pub unread_event_at: Option<DateTime<Utc>>,
    /// Local arrival instant of the newest message
    pub last_received_at: Option<DateTime<Utc>>,
    pub last_message: Option<LastMessage>,
    pub participants: Vec<Participant>,
    pub source: ConversationSource,
}

impl Conversation {
    pub fn new(id: impl Into<String>, source: ConversationSource) -> Self {
        Self {
            id: id.into(),
            message_ids: Vec::new(),
            messages: HashMap::new(),
            unread_count: 0,
            unread_updated_at: None,
            unread_event_at: None,
            last_received_at: None,
            last_message: None,
            participants: Vec::new(),
            source,
        }
    }

    /// Derived read state
    pub fn has_unseen(&self) -> bool {
        self.unread_count > 0
    }

    pub fn has_messages(&self) -> bool {
        !self.message_ids.is_empty()
    }

    /// Known only through snapshots, with no messages loaded yet
    pub fn is_snapshot_only(&self) -> bool {
        self.source == ConversationSource::Snapshot && !self.has_messages()
    }

    pub fn contains_message(&self, message_id: &str) -> bool {
        self.messages.contains_key(message_id)
    }

    pub fn message(&self, message_id: &str) -> Option<&Message> {
        self.messages.get(message_id)
    }

    /// Messages in arrival order
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.message_ids.iter().filter_map(|id| self.messages.get(id))
    }

    /// Append a message received locally at `received_at`. Returns false (and
    /// changes nothing) if the id is already present.
    pub(crate) fn push_message(&mut self, message: Message, received_at: DateTime<Utc>) -> bool {
        if self.messages.contains_key(&message.id) {
            return false;
        }
        self.last_received_at = self.last_received_at.max(Some(received_at));
        self.last_message = Some(LastMessage::from_message(&message));
        self.message_ids.push(message.id.clone());
        self.messages.insert(message.id.clone(), message);
        true
    }

    pub(crate) fn mark_message_deleted(&mut self, message_id: &str) -> bool {
        match self.messages.get_mut(message_id) {
            Some(message) if !message.is_deleted => {
                message.is_deleted = true;
                true
            }
            _ => false,
        }
    }

    /// Apply an `unread_updated`. Events are ordered among themselves by
    /// server timestamp; an older one than the last applied is rejected.
    pub(crate) fn apply_unread_event(
        &mut self,
        unread_count: u32,
        server_at: DateTime<Utc>,
        received_at: DateTime<Utc>,
    ) -> bool {
        if self.unread_event_at.is_some_and(|last| server_at < last) {
            return false;
        }
        self.unread_event_at = Some(server_at);
        self.write_unread(unread_count, received_at);
        true
    }

    /// Apply a snapshot count fetched at local instant `requested_at`.
    /// Rejected when a write arrived after the fetch was issued.
    pub(crate) fn apply_snapshot_unread(&mut self, unread_count: u32, requested_at: DateTime<Utc>) -> bool {
        if self.unread_updated_at.is_some_and(|last| requested_at < last) {
            return false;
        }
        self.write_unread(unread_count, requested_at);
        true
    }

    /// Local read. Always wins: nothing newer than the user's own action can
    /// be known locally.
    pub(crate) fn mark_read(&mut self, at: DateTime<Utc>) {
        self.write_unread(0, at);
    }

    fn write_unread(&mut self, unread_count: u32, at: DateTime<Utc>) {
        self.unread_count = unread_count;
        self.unread_updated_at = self.unread_updated_at.max(Some(at));
    }
}

/// One conversation as returned by the snapshot endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub last_message: Option<LastMessage>,
    #[serde(default)]
    pub participants: Vec<Participant>,
}

/// A fetched list of summaries, stamped with the instant the fetch was issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotBatch {
    pub requested_at: DateTime<Utc>,
    pub conversations: Vec<ConversationSummary>,
}

impl SnapshotBatch {
    pub fn new(requested_at: DateTime<Utc>, conversations: Vec<ConversationSummary>) -> Self {
        Self {
            requested_at,
            conversations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SenderInfo;
    use chrono::{Duration, TimeZone};

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn message(id: &str) -> Message {
        Message {
            id: id.to_string(),
            conversation_id: "c1".to_string(),
            sender: SenderInfo::Guest { id: "g1".into(), name: None },
            body: format!("body {}", id),
            created_at: ts(0),
            is_deleted: false,
        }
    }

    #[test]
    fn test_push_message_is_idempotent() {
        let mut conv = Conversation::new("c1", ConversationSource::Event);
        assert!(conv.push_message(message("m1"), ts(1)));
        assert!(conv.push_message(message("m2"), ts(2)));
        assert!(!conv.push_message(message("m1"), ts(1)));

        assert_eq!(conv.message_ids, vec!["m1", "m2"]);
        assert_eq!(conv.last_message.as_ref().unwrap().message_id.as_deref(), Some("m2"));
    }

    #[test]
    fn test_unread_events_ordered_by_server_time() {
        let mut conv = Conversation::new("c1", ConversationSource::Event);
        assert!(conv.apply_unread_event(3, ts(10), ts(100)));
        assert!(!conv.apply_unread_event(5, ts(10) - Duration::seconds(1), ts(101)));
        assert_eq!(conv.unread_count, 3);

        // equal timestamps: later arrival wins
        assert!(conv.apply_unread_event(0, ts(10), ts(102)));
        assert_eq!(conv.unread_count, 0);
        assert!(!conv.has_unseen());
        assert_eq!(conv.unread_updated_at, Some(ts(102)));
    }

    #[test]
    fn test_snapshot_loses_to_later_local_write() {
        let mut conv = Conversation::new("c1", ConversationSource::Event);
        // server clock far ahead of the local one
        conv.apply_unread_event(0, ts(5_000), ts(105));

        assert!(!conv.apply_snapshot_unread(4, ts(100)));
        assert_eq!(conv.unread_count, 0);
        assert!(conv.apply_snapshot_unread(2, ts(105)));
        assert_eq!(conv.unread_count, 2);
    }

    #[test]
    fn test_mark_read_wins_regardless_of_server_time() {
        let mut conv = Conversation::new("c1", ConversationSource::Event);
        conv.apply_unread_event(3, ts(5_000), ts(100));

        conv.mark_read(ts(50));
        assert_eq!(conv.unread_count, 0);
        // the local stamp never moves backwards
        assert_eq!(conv.unread_updated_at, Some(ts(100)));

        // a later event from the server still applies
        assert!(conv.apply_unread_event(1, ts(5_001), ts(101)));
        assert_eq!(conv.unread_count, 1);
    }

    #[test]
    fn test_push_message_records_arrival() {
        let mut conv = Conversation::new("c1", ConversationSource::Event);
        conv.push_message(message("m1"), ts(7));
        conv.push_message(message("m2"), ts(3));
        assert_eq!(conv.last_received_at, Some(ts(7)));
    }

    #[test]
    fn test_soft_delete_keeps_id() {
        let mut conv = Conversation::new("c1", ConversationSource::Event);
        conv.push_message(message("m1"), ts(1));
        assert!(conv.mark_message_deleted("m1"));
        assert!(!conv.mark_message_deleted("m1"));
        assert!(!conv.mark_message_deleted("missing"));

        assert!(conv.contains_message("m1"));
        assert!(conv.message("m1").unwrap().is_deleted);
        assert!(!conv.push_message(message("m1"), ts(1)));
    }

    #[test]
    fn test_snapshot_only() {
        let mut conv = Conversation::new("c1", ConversationSource::Snapshot);
        assert!(conv.is_snapshot_only());
        conv.push_message(message("m1"), ts(1));
        assert!(!conv.is_snapshot_only());
    }
}

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::events::{MessageCreated, MessageDeleted, UnreadUpdated};
use crate::models::{Conversation, ConversationSource, SnapshotBatch};

/// Result of applying an unread-count update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnreadApply {
    Applied,
    /// Older than the value already held
    Stale,
}

/// Per-batch counts, for logging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotMerge {
    pub created: usize,
    pub counts_applied: usize,
    pub counts_kept: usize,
}

/// Normalized conversation/message store - the only mutable source of truth.
///
/// Conversations sit behind an `Arc` so [`ConversationStore::snapshot`] is a
/// cheap, immutable view; mutation goes through `Arc::make_mut`, so a held
/// snapshot never observes later changes.
pub struct ConversationStore {
    conversations: Arc<BTreeMap<String, Conversation>>,
    /// Conversations touched by message events since the last tick
    touched: BTreeSet<String>,
    /// Number of snapshot batches merged since the store was created or cleared
    snapshot_generation: u64,
}

/// Read-only view of the store at one instant
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    conversations: Arc<BTreeMap<String, Conversation>>,
    snapshot_generation: u64,
}

impl StoreSnapshot {
    pub fn get(&self, conversation_id: &str) -> Option<&Conversation> {
        self.conversations.get(conversation_id)
    }

    pub fn conversations(&self) -> impl Iterator<Item = &Conversation> {
        self.conversations.values()
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    /// Whether at least one snapshot batch has been merged
    pub fn has_snapshot(&self) -> bool {
        self.snapshot_generation > 0
    }
}

impl ConversationStore {
    pub fn new() -> Self {
        Self {
            conversations: Arc::new(BTreeMap::new()),
            touched: BTreeSet::new(),
            snapshot_generation: 0,
        }
    }

    pub fn clear(&mut self) {
        self.conversations = Arc::new(BTreeMap::new());
        self.touched.clear();
        self.snapshot_generation = 0;
    }

    // ===== Getters =====

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            conversations: Arc::clone(&self.conversations),
            snapshot_generation: self.snapshot_generation,
        }
    }

    pub fn get(&self, conversation_id: &str) -> Option<&Conversation> {
        self.conversations.get(conversation_id)
    }

    pub fn unread_count(&self, conversation_id: &str) -> u32 {
        self.get(conversation_id).map(|c| c.unread_count).unwrap_or(0)
    }

    pub fn has_touched(&self) -> bool {
        !self.touched.is_empty()
    }

    /// Drain the conversations touched since the previous call
    pub fn take_touched(&mut self) -> BTreeSet<String> {
        std::mem::take(&mut self.touched)
    }

    // ===== Mutations =====

    fn conversation_mut(&mut self, conversation_id: &str, source: ConversationSource) -> &mut Conversation {
        let conversations = Arc::make_mut(&mut self.conversations);
        let conversation = conversations
            .entry(conversation_id.to_string())
            .or_insert_with(|| Conversation::new(conversation_id, source));
        if source == ConversationSource::Event {
            conversation.source = ConversationSource::Event;
        }
        conversation
    }

    /// Append a message unless its id is already present. Returns whether the
    /// message was new.
    pub fn apply_message_event(&mut self, event: MessageCreated, received_at: DateTime<Utc>) -> bool {
        let conversation_id = event.conversation_id;
        let message_id = event.message.id.clone();
        let added = self
            .conversation_mut(&conversation_id, ConversationSource::Event)
            .push_message(event.message, received_at);

        if added {
            self.touched.insert(conversation_id);
        } else {
            tracing::debug!(
                conversation_id = %conversation_id,
                message_id = %message_id,
                "duplicate message ignored"
            );
        }
        added
    }

    /// Last-write-wins among events by server timestamp; the write itself is
    /// stamped with the local arrival instant.
    pub fn apply_unread_event(&mut self, event: UnreadUpdated, received_at: DateTime<Utc>) -> UnreadApply {
        let conversation = self.conversation_mut(&event.conversation_id, ConversationSource::Event);
        if conversation.apply_unread_event(event.unread_count, event.timestamp, received_at) {
            UnreadApply::Applied
        } else {
            tracing::debug!(
                conversation_id = %event.conversation_id,
                unread_count = event.unread_count,
                "stale unread_updated rejected"
            );
            UnreadApply::Stale
        }
    }

    pub fn apply_message_deleted(&mut self, event: MessageDeleted) -> bool {
        let Some(conversation) = Arc::make_mut(&mut self.conversations).get_mut(&event.conversation_id) else {
            return false;
        };
        conversation.mark_message_deleted(&event.message_id)
    }

    /// Local read (the user opened the conversation). Applies whatever the
    /// server timestamps say; only unknown conversations are left alone.
    pub fn mark_read(&mut self, conversation_id: &str, at: DateTime<Utc>) -> UnreadApply {
        let Some(conversation) = Arc::make_mut(&mut self.conversations).get_mut(conversation_id) else {
            return UnreadApply::Stale;
        };
        conversation.mark_read(at);
        UnreadApply::Applied
    }

    /// Monotonic merge of a fetched batch. A summary's unread count only
    /// replaces the held value when nothing was written locally after the
    /// fetch was requested.
    pub fn apply_snapshot(&mut self, batch: SnapshotBatch) -> SnapshotMerge {
        let mut merge = SnapshotMerge::default();
        let requested_at = batch.requested_at;

        for summary in batch.conversations {
            if summary.id.is_empty() {
                tracing::warn!("snapshot summary without id dropped");
                continue;
            }
            if self.get(&summary.id).is_none() {
                merge.created += 1;
            }

            let conversation = self.conversation_mut(&summary.id, ConversationSource::Snapshot);
            if !summary.participants.is_empty() {
                conversation.participants = summary.participants;
            }
            if conversation.last_message.is_none() || !conversation.has_messages() {
                if let Some(last) = summary.last_message {
                    conversation.last_message = Some(last);
                }
            }

            if conversation.apply_snapshot_unread(summary.unread_count, requested_at) {
                merge.counts_applied += 1;
            } else {
                merge.counts_kept += 1;
            }
        }

        self.snapshot_generation += 1;
        tracing::info!(
            generation = self.snapshot_generation,
            created = merge.created,
            counts_applied = merge.counts_applied,
            counts_kept = merge.counts_kept,
            "snapshot merged"
        );
        merge
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConversationSummary, Message, SenderInfo};
    use chrono::{Duration, TimeZone};

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn created(conversation_id: &str, message_id: &str) -> MessageCreated {
        MessageCreated {
            conversation_id: conversation_id.to_string(),
            message: Message {
                id: message_id.to_string(),
                conversation_id: conversation_id.to_string(),
                sender: SenderInfo::Guest { id: "g1".into(), name: None },
                body: "hi".to_string(),
                created_at: ts(0),
                is_deleted: false,
            },
        }
    }

    fn unread(conversation_id: &str, count: u32, at: DateTime<Utc>) -> UnreadUpdated {
        UnreadUpdated {
            conversation_id: conversation_id.to_string(),
            staff_id: None,
            total_unread: None,
            unread_count: count,
            timestamp: at,
        }
    }

    fn summary(id: &str, unread_count: u32) -> ConversationSummary {
        ConversationSummary {
            id: id.to_string(),
            unread_count,
            last_message: None,
            participants: Vec::new(),
        }
    }

    #[test]
    fn test_duplicate_message_ids_stored_once() {
        let mut store = ConversationStore::new();
        for id in ["m1", "m2", "m1", "m3", "m2", "m1"] {
            store.apply_message_event(created("c1", id), ts(0));
        }

        let conv = store.get("c1").unwrap();
        assert_eq!(conv.message_ids, vec!["m1", "m2", "m3"]);
        assert_eq!(store.take_touched().into_iter().collect::<Vec<_>>(), vec!["c1"]);
        assert!(!store.has_touched());
    }

    #[test]
    fn test_duplicate_does_not_touch() {
        let mut store = ConversationStore::new();
        store.apply_message_event(created("c1", "m1"), ts(0));
        store.take_touched();

        assert!(!store.apply_message_event(created("c1", "m1"), ts(0)));
        assert!(!store.has_touched());
    }

    #[test]
    fn test_unread_last_write_wins() {
        let mut store = ConversationStore::new();
        assert_eq!(store.apply_unread_event(unread("c1", 2, ts(10)), ts(10)), UnreadApply::Applied);
        assert_eq!(store.apply_unread_event(unread("c1", 5, ts(5)), ts(5)), UnreadApply::Stale);
        assert_eq!(store.unread_count("c1"), 2);
        assert_eq!(store.apply_unread_event(unread("c1", 0, ts(11)), ts(11)), UnreadApply::Applied);
        assert_eq!(store.unread_count("c1"), 0);
    }

    #[test]
    fn test_stale_snapshot_keeps_newer_event_count() {
        let mut store = ConversationStore::new();
        store.apply_unread_event(unread("c4", 0, ts(20)), ts(20));

        let merge = store.apply_snapshot(SnapshotBatch::new(ts(10), vec![summary("c4", 6)]));
        assert_eq!(merge.counts_kept, 1);
        assert_eq!(store.unread_count("c4"), 0);

        let merge = store.apply_snapshot(SnapshotBatch::new(ts(20), vec![summary("c4", 1)]));
        assert_eq!(merge.counts_applied, 1);
        assert_eq!(store.unread_count("c4"), 1);
    }

    #[test]
    fn test_snapshot_creates_snapshot_only_conversations() {
        let mut store = ConversationStore::new();
        assert!(!store.snapshot().has_snapshot());

        let merge = store.apply_snapshot(SnapshotBatch::new(ts(0), vec![summary("c1", 2), summary("", 9)]));
        assert_eq!(merge.created, 1);

        let snapshot = store.snapshot();
        assert!(snapshot.has_snapshot());
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.get("c1").unwrap().is_snapshot_only());

        store.apply_message_event(created("c1", "m1"), ts(0));
        assert_eq!(store.get("c1").unwrap().source, ConversationSource::Event);
    }

    #[test]
    fn test_snapshot_view_is_immutable() {
        let mut store = ConversationStore::new();
        store.apply_unread_event(unread("c1", 1, ts(0)), ts(0));
        let before = store.snapshot();

        store.apply_unread_event(unread("c1", 4, ts(1)), ts(1));
        store.apply_message_event(created("c2", "m1"), ts(0));

        assert_eq!(before.get("c1").unwrap().unread_count, 1);
        assert!(before.get("c2").is_none());
        assert_eq!(store.snapshot().get("c1").unwrap().unread_count, 4);
    }

    #[test]
    fn test_mark_read_and_delete() {
        let mut store = ConversationStore::new();
        store.apply_message_event(created("c1", "m1"), ts(0));
        store.apply_unread_event(unread("c1", 1, ts(0)), ts(0));

        assert_eq!(store.mark_read("c1", ts(0) + Duration::seconds(1)), UnreadApply::Applied);
        assert_eq!(store.unread_count("c1"), 0);
        assert_eq!(store.mark_read("unknown", ts(2)), UnreadApply::Stale);
        assert!(store.get("unknown").is_none());

        assert!(store.apply_message_deleted(MessageDeleted {
            conversation_id: "c1".into(),
            message_id: "m1".into(),
        }));
        assert!(!store.apply_message_deleted(MessageDeleted {
            conversation_id: "c9".into(),
            message_id: "m1".into(),
        }));
    }

    #[test]
    fn test_fetch_issued_before_read_event_is_kept_out() {
        // the server clock runs 30s behind the local one
        let mut store = ConversationStore::new();
        let requested_at = ts(100);
        store.apply_unread_event(unread("c1", 0, ts(75)), requested_at + Duration::seconds(5));

        let merge = store.apply_snapshot(SnapshotBatch::new(requested_at, vec![summary("c1", 4)]));
        assert_eq!(merge.counts_kept, 1);
        assert_eq!(store.unread_count("c1"), 0);
    }

    #[test]
    fn test_mark_read_applies_when_server_clock_is_ahead() {
        let mut store = ConversationStore::new();
        store.apply_unread_event(unread("c1", 3, ts(130)), ts(100));

        assert_eq!(store.mark_read("c1", ts(101)), UnreadApply::Applied);
        assert_eq!(store.unread_count("c1"), 0);
    }

    #[test]
    fn test_clear_forgets_everything() {
        let mut store = ConversationStore::new();
        store.apply_snapshot(SnapshotBatch::new(ts(0), vec![summary("c1", 2)]));
        store.apply_message_event(created("c2", "m1"), ts(0));

        store.clear();
        assert!(store.snapshot().is_empty());
        assert!(!store.snapshot().has_snapshot());
        assert!(!store.has_touched());
        assert_eq!(store.unread_count("c1"), 0);
    }
}

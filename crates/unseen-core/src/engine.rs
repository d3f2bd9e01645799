use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::aggregate::total_unread;
use crate::config::EngineConfig;
use crate::events::ChannelEvent;
use crate::models::{NotificationEntry, NotificationView, SnapshotBatch};
use crate::reconciler::{Reconciler, TickReport};
use crate::store::{ConversationStore, SnapshotMerge, UnreadApply};

/// Single owner of the store and the reconciler.
///
/// Every mutation marks the engine dirty; callers decide when to [`tick`]
/// (the runtime coalesces, the replay CLI ticks after every line).
///
/// [`tick`]: NotificationEngine::tick
pub struct NotificationEngine {
    config: EngineConfig,
    store: ConversationStore,
    reconciler: Reconciler,
    dirty: bool,
}

impl NotificationEngine {
    pub fn new(config: EngineConfig) -> Self {
        let reconciler = Reconciler::new(config.staff_id.clone(), config.fallback_label.clone());
        Self {
            config,
            store: ConversationStore::new(),
            reconciler,
            // first tick of a mount always runs
            dirty: true,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    // ===== Actions =====

    /// Parse and apply a raw channel payload received now. Malformed payloads
    /// are logged and dropped.
    pub fn handle_raw_event(&mut self, raw: &Value) -> bool {
        self.handle_raw_event_at(raw, Utc::now())
    }

    pub fn handle_raw_event_at(&mut self, raw: &Value, received_at: DateTime<Utc>) -> bool {
        match ChannelEvent::from_value(raw) {
            Ok(event) => self.handle_event_at(event, received_at),
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed channel event");
                false
            }
        }
    }

    pub fn handle_event(&mut self, event: ChannelEvent) -> bool {
        self.handle_event_at(event, Utc::now())
    }

    /// Apply an event that arrived at local instant `received_at`. Returns
    /// whether the store changed.
    pub fn handle_event_at(&mut self, event: ChannelEvent, received_at: DateTime<Utc>) -> bool {
        let changed = match event {
            ChannelEvent::MessageCreated(created) => self.store.apply_message_event(created, received_at),
            ChannelEvent::UnreadUpdated(unread) => {
                if let Some(staff_id) = unread.staff_id.as_deref() {
                    if staff_id != self.config.staff_id {
                        tracing::debug!(
                            conversation_id = %unread.conversation_id,
                            staff_id,
                            "unread_updated for another staff member ignored"
                        );
                        return false;
                    }
                }
                self.store.apply_unread_event(unread, received_at) == UnreadApply::Applied
            }
            ChannelEvent::MessageDeleted(deleted) => self.store.apply_message_deleted(deleted),
        };
        self.dirty |= changed;
        changed
    }

    pub fn apply_snapshot(&mut self, batch: SnapshotBatch) -> SnapshotMerge {
        self.dirty = true;
        self.store.apply_snapshot(batch)
    }

    pub fn dismiss(&mut self, conversation_id: &str) -> bool {
        let unread = self.store.unread_count(conversation_id);
        let removed = self.reconciler.dismiss(conversation_id, unread);
        self.dirty = true;
        removed
    }

    pub fn dismiss_all(&mut self) -> usize {
        let store = &self.store;
        let removed = self.reconciler.dismiss_all(|id| store.unread_count(id));
        self.dirty = true;
        removed
    }

    /// The user opened a conversation: it is read locally as of `now`
    pub fn open(&mut self, conversation_id: &str, now: DateTime<Utc>) -> bool {
        self.store.mark_read(conversation_id, now);
        let removed = self.reconciler.opened(conversation_id);
        self.dirty = true;
        removed
    }

    /// Forget all entries and re-arm restoration, keeping the store
    pub fn remount(&mut self) {
        self.store.take_touched();
        self.reconciler.remount(&self.store.snapshot());
        self.dirty = true;
    }

    /// One reconciliation pass over the current store state
    pub fn tick(&mut self, now: DateTime<Utc>) -> TickReport {
        let touched = self.store.take_touched();
        let snapshot = self.store.snapshot();
        let report = self.reconciler.tick(&snapshot, &touched, now);
        self.dirty = false;
        report
    }

    // ===== Queries =====

    pub fn notifications(&self) -> Vec<NotificationEntry> {
        self.reconciler.notifications()
    }

    pub fn total_unread(&self) -> u64 {
        total_unread(&self.store.snapshot())
    }

    pub fn view(&self) -> NotificationView {
        NotificationView {
            entries: self.notifications(),
            total_unread: self.total_unread(),
        }
    }
}

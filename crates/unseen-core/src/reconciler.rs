//! Notification reconciliation.
//!
//! One [`Reconciler::tick`] turns an immutable [`StoreSnapshot`] into the
//! current notification set in three ordered passes:
//!
//! 1. **Event path** - messages that arrived since the previous tick in touched
//!    conversations, from anyone but the local user.
//! 2. **Fallback path** - conversations with a positive unread count and no
//!    entry (an `unread_updated` without a matching `message_created`).
//! 3. **Restoration path** - once per mount, conversations known only from a
//!    snapshot with a positive unread count.
//!
//! Every pass upserts by conversation id, so there is never more than one
//! entry per conversation. Removal runs last: an entry is dropped once the
//! store holds a zero unread count that is at least as new as the content the
//! entry counts.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use crate::models::{
    is_own_message, resolve_display_label, Conversation, NotificationEntry, NotificationOrigin,
    NotificationTrigger, RemovalReason,
};
use crate::store::StoreSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Restoration {
    /// Waiting for the first snapshot merge of this mount
    Pending,
    Done,
}

#[derive(Debug, Clone)]
struct Tracked {
    entry: NotificationEntry,
    /// Local arrival of the newest content this entry counts. A zero unread
    /// count written before this does not clear the entry; the next write
    /// after it (event, refresh or local read) does.
    basis: Option<DateTime<Utc>>,
}

/// What changed during one tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<(String, RemovalReason)>,
}

impl TickReport {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    fn mark_updated(&mut self, conversation_id: &str) {
        let id = conversation_id.to_string();
        if !self.created.contains(&id) && !self.updated.contains(&id) {
            self.updated.push(id);
        }
    }
}

pub struct Reconciler {
    staff_id: String,
    fallback_label: String,
    entries: HashMap<String, Tracked>,
    /// Per conversation, how many message ids have already been examined.
    /// Message ids are append-only, so the recorded id set is always a prefix.
    cursors: HashMap<String, usize>,
    restoration: Restoration,
    /// Unread count at dismissal time. Fallback and restoration stay quiet
    /// for these until the count rises or new content arrives.
    suppressed: HashMap<String, u32>,
    /// Removals requested between ticks, reported by the next tick
    pending_removals: Vec<(String, RemovalReason)>,
}

impl Reconciler {
    pub fn new(staff_id: impl Into<String>, fallback_label: impl Into<String>) -> Self {
        Self {
            staff_id: staff_id.into(),
            fallback_label: fallback_label.into(),
            entries: HashMap::new(),
            cursors: HashMap::new(),
            restoration: Restoration::Pending,
            suppressed: HashMap::new(),
            pending_removals: Vec::new(),
        }
    }

    /// Start a new mount: drop every entry, re-arm restoration and treat the
    /// messages already in the store as seen.
    pub fn remount(&mut self, snapshot: &StoreSnapshot) {
        self.entries.clear();
        self.suppressed.clear();
        self.pending_removals.clear();
        self.restoration = Restoration::Pending;
        self.cursors = snapshot
            .conversations()
            .map(|c| (c.id.clone(), c.message_ids.len()))
            .collect();
    }

    // ===== Queries =====

    /// Current entries, most recently updated first
    pub fn notifications(&self) -> Vec<NotificationEntry> {
        let mut entries: Vec<NotificationEntry> =
            self.entries.values().map(|t| t.entry.clone()).collect();
        entries.sort_by(|a, b| {
            b.last_update
                .cmp(&a.last_update)
                .then_with(|| a.conversation_id.cmp(&b.conversation_id))
        });
        entries
    }

    pub fn get(&self, conversation_id: &str) -> Option<&NotificationEntry> {
        self.entries.get(conversation_id).map(|t| &t.entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn restoration_pending(&self) -> bool {
        self.restoration == Restoration::Pending
    }

    // ===== Explicit removal =====

    /// Remove the entry for a conversation and suppress re-synthesis until
    /// its unread count rises above `unread_count`.
    pub fn dismiss(&mut self, conversation_id: &str, unread_count: u32) -> bool {
        self.remove_explicit(conversation_id, unread_count, RemovalReason::Dismissed)
    }

    /// The user opened the conversation
    pub fn opened(&mut self, conversation_id: &str) -> bool {
        self.remove_explicit(conversation_id, 0, RemovalReason::Opened)
    }

    /// Dismiss every entry. `unread_of` supplies each conversation's current count.
    pub fn dismiss_all(&mut self, unread_of: impl Fn(&str) -> u32) -> usize {
        let ids: Vec<String> = self.entries.keys().cloned().collect();
        for id in &ids {
            let unread = unread_of(id);
            self.remove_explicit(id, unread, RemovalReason::Dismissed);
        }
        ids.len()
    }

    fn remove_explicit(&mut self, conversation_id: &str, unread_count: u32, reason: RemovalReason) -> bool {
        self.suppressed.insert(conversation_id.to_string(), unread_count);
        if self.entries.remove(conversation_id).is_some() {
            self.pending_removals.push((conversation_id.to_string(), reason));
            true
        } else {
            false
        }
    }

    // ===== Tick =====

    /// Run the three passes and the removal sweep over one snapshot.
    /// `touched` holds the conversations that received messages since the
    /// previous tick.
    pub fn tick(
        &mut self,
        snapshot: &StoreSnapshot,
        touched: &BTreeSet<String>,
        now: DateTime<Utc>,
    ) -> TickReport {
        let mut report = TickReport {
            removed: std::mem::take(&mut self.pending_removals),
            ..TickReport::default()
        };

        self.event_pass(snapshot, touched, now, &mut report);
        self.fallback_pass(snapshot, now, &mut report);
        if self.restoration == Restoration::Pending && snapshot.has_snapshot() {
            self.restoration_pass(snapshot, now, &mut report);
            self.restoration = Restoration::Done;
        }
        self.removal_pass(snapshot, &mut report);

        if !report.is_empty() {
            tracing::debug!(
                created = ?report.created,
                updated = ?report.updated,
                removed = ?report.removed,
                entries = self.entries.len(),
                "reconciliation tick"
            );
        }
        report
    }

    fn event_pass(
        &mut self,
        snapshot: &StoreSnapshot,
        touched: &BTreeSet<String>,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) {
        for conversation_id in touched {
            let Some(conversation) = snapshot.get(conversation_id) else {
                continue;
            };

            let cursor = self.cursors.entry(conversation_id.clone()).or_insert(0);
            let start = (*cursor).min(conversation.message_ids.len());
            *cursor = conversation.message_ids.len();

            for message_id in &conversation.message_ids[start..] {
                let Some(message) = conversation.message(message_id) else {
                    continue;
                };
                if message.is_deleted || is_own_message(&message.sender, &self.staff_id) {
                    continue;
                }

                self.suppressed.remove(conversation_id);
                let label = resolve_display_label(
                    Some(&message.sender),
                    &conversation.participants,
                    &self.staff_id,
                    &self.fallback_label,
                );
                let trigger = NotificationTrigger::Message {
                    message_id: message.id.clone(),
                };

                match self.entries.get_mut(conversation_id) {
                    Some(tracked) => {
                        tracked.entry.count = tracked.entry.count.saturating_add(1);
                        tracked.entry.last_update = now;
                        tracked.entry.trigger = trigger;
                        tracked.entry.label = label;
                        tracked.basis = tracked.basis.max(conversation.last_received_at);
                        report.mark_updated(conversation_id);
                    }
                    None => {
                        let entry = NotificationEntry::new(
                            conversation_id.clone(),
                            1,
                            NotificationOrigin::EventDerived,
                            trigger,
                            label,
                            now,
                        );
                        self.entries.insert(
                            conversation_id.clone(),
                            Tracked {
                                entry,
                                basis: conversation.last_received_at,
                            },
                        );
                        report.created.push(conversation_id.clone());
                    }
                }
            }
        }
    }

    fn fallback_pass(&mut self, snapshot: &StoreSnapshot, now: DateTime<Utc>, report: &mut TickReport) {
        let restoring = self.restoration == Restoration::Pending;

        for conversation in snapshot.conversations() {
            if !conversation.has_unseen() {
                continue;
            }

            if let Some(tracked) = self.entries.get_mut(&conversation.id) {
                // keep the count monotonic while unseen
                if conversation.unread_count > tracked.entry.count {
                    tracked.entry.count = conversation.unread_count;
                    tracked.entry.last_update = now;
                    tracked.basis = tracked.basis.max(conversation.unread_updated_at);
                    report.mark_updated(&conversation.id);
                }
                continue;
            }

            if restoring && conversation.is_snapshot_only() {
                continue;
            }
            if self.is_suppressed(conversation) {
                continue;
            }

            let entry = NotificationEntry::new(
                conversation.id.clone(),
                conversation.unread_count,
                NotificationOrigin::FallbackDerived,
                NotificationTrigger::UnreadCount {
                    unread_count: conversation.unread_count,
                },
                self.label_for(conversation),
                now,
            );
            self.insert(conversation, entry, report);
        }
    }

    fn restoration_pass(&mut self, snapshot: &StoreSnapshot, now: DateTime<Utc>, report: &mut TickReport) {
        let mut restored = 0usize;

        for conversation in snapshot.conversations() {
            if !conversation.is_snapshot_only() || !conversation.has_unseen() {
                continue;
            }
            if self.entries.contains_key(&conversation.id) || self.is_suppressed(conversation) {
                continue;
            }

            let requested_at = conversation.unread_updated_at.unwrap_or(now);
            let entry = NotificationEntry::new(
                conversation.id.clone(),
                conversation.unread_count,
                NotificationOrigin::Restored,
                NotificationTrigger::Snapshot { requested_at },
                self.label_for(conversation),
                now,
            );
            self.insert(conversation, entry, report);
            restored += 1;
        }

        tracing::info!(restored, "restoration pass complete");
    }

    fn removal_pass(&mut self, snapshot: &StoreSnapshot, report: &mut TickReport) {
        let mut removals = Vec::new();

        for (conversation_id, tracked) in &self.entries {
            match snapshot.get(conversation_id) {
                None => removals.push((conversation_id.clone(), RemovalReason::Missing)),
                Some(conversation) if conversation.unread_count == 0 => {
                    let read_covers_entry = match (conversation.unread_updated_at, tracked.basis) {
                        (Some(read_at), Some(basis)) => read_at >= basis,
                        (Some(_), None) => true,
                        // no count written yet; wait for the next event or refresh
                        (None, _) => false,
                    };
                    if read_covers_entry {
                        removals.push((conversation_id.clone(), RemovalReason::Read));
                    }
                }
                Some(_) => {}
            }
        }

        for (conversation_id, reason) in removals {
            self.entries.remove(&conversation_id);
            report.created.retain(|id| id != &conversation_id);
            report.updated.retain(|id| id != &conversation_id);
            report.removed.push((conversation_id, reason));
        }

        // a conversation read to zero no longer needs suppression
        self.suppressed.retain(|conversation_id, _| {
            snapshot
                .get(conversation_id)
                .map(|c| c.has_unseen())
                .unwrap_or(false)
        });
    }

    fn is_suppressed(&mut self, conversation: &Conversation) -> bool {
        match self.suppressed.get(&conversation.id) {
            Some(&at_dismissal) if conversation.unread_count <= at_dismissal => true,
            Some(_) => {
                self.suppressed.remove(&conversation.id);
                false
            }
            None => false,
        }
    }

    fn insert(&mut self, conversation: &Conversation, entry: NotificationEntry, report: &mut TickReport) {
        report.created.push(conversation.id.clone());
        self.entries.insert(
            conversation.id.clone(),
            Tracked {
                entry,
                basis: conversation.unread_updated_at,
            },
        );
    }

    fn label_for(&self, conversation: &Conversation) -> String {
        let sender = conversation
            .last_message
            .as_ref()
            .map(|last| &last.sender)
            .filter(|sender| !is_own_message(sender, &self.staff_id));
        resolve_display_label(
            sender,
            &conversation.participants,
            &self.staff_id,
            &self.fallback_label,
        )
    }
}

//! Engine-wide constants
//!
//! Centralized location for default values and wire strings that are used
//! across multiple modules.

/// Label shown when no sender name can be resolved for a notification
pub const DEFAULT_SENDER_LABEL: &str = "Someone";

/// Default interval between periodic snapshot refreshes
pub const DEFAULT_SNAPSHOT_INTERVAL_SECS: u64 = 30;

/// Default window during which mutations are coalesced into a single tick
pub const DEFAULT_COALESCE_WINDOW_MS: u64 = 250;

/// Delay before re-subscribing after the event channel closes
pub const DEFAULT_RESUBSCRIBE_DELAY_SECS: u64 = 2;

/// Capacity of the command channel between handles and the driver task
pub const COMMAND_CHANNEL_CAPACITY: usize = 64;

// Event kinds carried in the "type" field of channel payloads
pub mod kinds {
    /// A new message was posted to a conversation
    pub const MESSAGE_CREATED: &str = "message_created";
    /// Server-computed unread count changed for a conversation
    pub const UNREAD_UPDATED: &str = "unread_updated";
    /// A message was soft-deleted
    pub const MESSAGE_DELETED: &str = "message_deleted";
}

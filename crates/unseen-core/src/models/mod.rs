pub mod conversation;
pub mod message;
pub mod notification;
pub mod sender;

pub use conversation::{Conversation, ConversationSource, ConversationSummary, SnapshotBatch};
pub use message::{LastMessage, Message};
pub use notification::{
    NotificationEntry, NotificationOrigin, NotificationTrigger, NotificationView, RemovalReason,
};
pub use sender::{is_own_message, resolve_display_label, Participant, ParticipantKind, SenderInfo};

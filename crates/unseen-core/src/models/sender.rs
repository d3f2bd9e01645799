use serde::{Deserialize, Serialize};

/// Who sent a message, in every shape the wire has been seen to carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SenderInfo {
    Staff { id: String, name: Option<String> },
    Guest { id: String, name: Option<String> },
    /// Automated message with no human sender
    System,
    /// Sender type missing or unrecognised
    Unknown { id: Option<String>, name: Option<String> },
}

impl SenderInfo {
    /// Build from the flat `sender_id` / `sender_type` / `sender_name` fields
    /// used by message payloads and snapshot summaries.
    pub fn from_parts(id: Option<String>, kind: Option<&str>, name: Option<String>) -> Self {
        let name = name.filter(|n| !n.trim().is_empty());
        match (kind, id) {
            (Some("system"), _) => SenderInfo::System,
            (Some("staff"), Some(id)) => SenderInfo::Staff { id, name },
            (Some("guest"), Some(id)) => SenderInfo::Guest { id, name },
            (_, id) => SenderInfo::Unknown { id, name },
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            SenderInfo::Staff { id, .. } | SenderInfo::Guest { id, .. } => Some(id),
            SenderInfo::System => None,
            SenderInfo::Unknown { id, .. } => id.as_deref(),
        }
    }

    /// Explicit display name carried by the sender itself, if any
    pub fn name(&self) -> Option<&str> {
        match self {
            SenderInfo::Staff { name, .. }
            | SenderInfo::Guest { name, .. }
            | SenderInfo::Unknown { name, .. } => name.as_deref(),
            SenderInfo::System => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantKind {
    Staff,
    #[default]
    Guest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "type")]
    pub kind: ParticipantKind,
}

impl Participant {
    pub fn is_self(&self, staff_id: &str) -> bool {
        self.kind == ParticipantKind::Staff && self.id == staff_id
    }
}

/// Whether a message was written by the local staff member.
///
/// `Unknown` senders count as own when their id matches, since some payloads
/// omit the sender type for the author's own echo. The cost is that an untyped
/// message from a guest whose id equals `staff_id` is suppressed too; a typed
/// `Guest` with a matching id is never own.
pub fn is_own_message(sender: &SenderInfo, staff_id: &str) -> bool {
    match sender {
        SenderInfo::Staff { id, .. } => id == staff_id,
        SenderInfo::Unknown { id: Some(id), .. } => id == staff_id,
        SenderInfo::Guest { .. } | SenderInfo::System | SenderInfo::Unknown { id: None, .. } => false,
    }
}

/// Resolve the label shown on a notification.
///
/// Chain: explicit sender name, then the first named participant other than
/// the local user, then `fallback`.
pub fn resolve_display_label(
    sender: Option<&SenderInfo>,
    participants: &[Participant],
    staff_id: &str,
    fallback: &str,
) -> String {
    if let Some(name) = sender.and_then(SenderInfo::name) {
        return name.to_string();
    }

    participants
        .iter()
        .filter(|p| !p.is_self(staff_id))
        .find_map(|p| p.name.as_deref().filter(|n| !n.trim().is_empty()))
        .unwrap_or(fallback)
        .to_string()
}

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use unseen_core::models::{ConversationSummary, SnapshotBatch};

/// One line of a recorded session
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayStep {
    /// Raw channel payload, handed to the engine as-is
    Event(Value),
    Snapshot(SnapshotBatch),
    Dismiss { conversation_id: String },
    DismissAll,
    Open {
        conversation_id: String,
        at: Option<DateTime<Utc>>,
    },
    Remount,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ControlLine {
    Snapshot {
        fetched_at: DateTime<Utc>,
        #[serde(default)]
        conversations: Vec<ConversationSummary>,
    },
    Dismiss {
        conversation_id: String,
    },
    DismissAll,
    Open {
        conversation_id: String,
        #[serde(default)]
        at: Option<DateTime<Utc>>,
    },
    Remount,
}

const CONTROL_TYPES: &[&str] = &["snapshot", "dismiss", "dismiss_all", "open", "remount"];

impl ReplayStep {
    pub fn parse(line: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(line).context("Line is not valid JSON")?;

        let is_control = value
            .get("type")
            .and_then(Value::as_str)
            .map(|kind| CONTROL_TYPES.contains(&kind))
            .unwrap_or(false);
        if !is_control {
            return Ok(ReplayStep::Event(value));
        }

        let control: ControlLine = serde_json::from_value(value).context("Invalid control line")?;
        Ok(match control {
            ControlLine::Snapshot {
                fetched_at,
                conversations,
            } => ReplayStep::Snapshot(SnapshotBatch::new(fetched_at, conversations)),
            ControlLine::Dismiss { conversation_id } => ReplayStep::Dismiss { conversation_id },
            ControlLine::DismissAll => ReplayStep::DismissAll,
            ControlLine::Open { conversation_id, at } => ReplayStep::Open { conversation_id, at },
            ControlLine::Remount => ReplayStep::Remount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_pass_through() {
        let step = ReplayStep::parse(r#"{"type": "unread_updated", "conversation_id": "c1"}"#).unwrap();
        assert!(matches!(step, ReplayStep::Event(_)));

        // untyped lines are still handed to the engine, which drops them
        let step = ReplayStep::parse(r#"{"hello": 1}"#).unwrap();
        assert!(matches!(step, ReplayStep::Event(_)));
    }

    #[test]
    fn test_control_lines() {
        let step = ReplayStep::parse(
            r#"{"type": "snapshot", "fetched_at": "2026-01-01T00:00:00Z", "conversations": [{"id": "c1", "unread_count": 2}]}"#,
        )
        .unwrap();
        let ReplayStep::Snapshot(batch) = step else {
            panic!("expected snapshot");
        };
        assert_eq!(batch.conversations.len(), 1);

        assert_eq!(
            ReplayStep::parse(r#"{"type": "dismiss", "conversation_id": "c1"}"#).unwrap(),
            ReplayStep::Dismiss { conversation_id: "c1".into() }
        );
        assert_eq!(ReplayStep::parse(r#"{"type": "dismiss_all"}"#).unwrap(), ReplayStep::DismissAll);
        assert_eq!(ReplayStep::parse(r#"{"type": "remount"}"#).unwrap(), ReplayStep::Remount);
        assert!(matches!(
            ReplayStep::parse(r#"{"type": "open", "conversation_id": "c2"}"#).unwrap(),
            ReplayStep::Open { at: None, .. }
        ));
    }

    #[test]
    fn test_bad_lines() {
        assert!(ReplayStep::parse("not json").is_err());
        assert!(ReplayStep::parse(r#"{"type": "dismiss"}"#).is_err());
    }
}

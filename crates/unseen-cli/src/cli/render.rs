use std::io::Write;

use anyhow::Result;
use serde::Serialize;
use unseen_core::models::{NotificationOrigin, NotificationView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

#[derive(Serialize)]
struct ViewLine<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<usize>,
    #[serde(flatten)]
    view: &'a NotificationView,
}

fn origin_label(origin: NotificationOrigin) -> &'static str {
    match origin {
        NotificationOrigin::EventDerived => "event",
        NotificationOrigin::FallbackDerived => "fallback",
        NotificationOrigin::Restored => "restored",
    }
}

/// Print a view, optionally prefixed with the replay line that produced it
pub fn write_view<W: Write>(
    out: &mut W,
    line: Option<usize>,
    view: &NotificationView,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer(&mut *out, &ViewLine { line, view })?;
            writeln!(out)?;
        }
        OutputFormat::Text => {
            if let Some(line) = line {
                write!(out, "[{}] ", line)?;
            }
            writeln!(
                out,
                "{} notification(s), {} unread",
                view.entries.len(),
                view.total_unread
            )?;
            for entry in &view.entries {
                writeln!(
                    out,
                    "  {:<24} x{:<4} {:<9} {}",
                    entry.conversation_id,
                    entry.count,
                    origin_label(entry.origin),
                    entry.label
                )?;
            }
        }
    }
    Ok(())
}

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use unseen_core::{ChannelEvent, NotificationEngine};

use super::protocol::ReplayStep;
use super::render::{write_view, OutputFormat};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub lines: usize,
    /// Lines that were not valid JSON or not a valid control line
    pub skipped: usize,
}

/// Stands in for the local clock of the recorded session: it advances to the
/// newest timestamp seen so far, so lines are received in file order.
#[derive(Debug, Default)]
struct ReplayClock {
    now: DateTime<Utc>,
}

impl ReplayClock {
    fn advance(&mut self, seen: Option<DateTime<Utc>>) -> DateTime<Utc> {
        if let Some(seen) = seen {
            self.now = self.now.max(seen);
        }
        self.now
    }
}

fn event_time(event: &ChannelEvent) -> Option<DateTime<Utc>> {
    match event {
        ChannelEvent::MessageCreated(created) => Some(created.message.created_at),
        ChannelEvent::UnreadUpdated(unread) => Some(unread.timestamp),
        ChannelEvent::MessageDeleted(_) => None,
    }
}

fn apply_step(engine: &mut NotificationEngine, clock: &mut ReplayClock, step: ReplayStep) {
    match step {
        ReplayStep::Event(raw) => match ChannelEvent::from_value(&raw) {
            Ok(event) => {
                let received_at = clock.advance(event_time(&event));
                engine.handle_event_at(event, received_at);
            }
            Err(_) => {
                // logged and dropped by the engine
                engine.handle_raw_event_at(&raw, clock.now);
            }
        },
        ReplayStep::Snapshot(batch) => {
            clock.advance(Some(batch.requested_at));
            engine.apply_snapshot(batch);
        }
        ReplayStep::Dismiss { conversation_id } => {
            engine.dismiss(&conversation_id);
        }
        ReplayStep::DismissAll => {
            engine.dismiss_all();
        }
        ReplayStep::Open { conversation_id, at } => {
            let at = clock.advance(at);
            engine.open(&conversation_id, at);
        }
        ReplayStep::Remount => engine.remount(),
    }
}

/// Feed a recorded session through the engine, one line at a time.
///
/// The engine ticks after every line and the resulting view is written to
/// `out`. Blank lines are ignored; unparseable lines are logged and skipped.
pub fn run_replay<R: BufRead, W: Write>(
    engine: &mut NotificationEngine,
    input: R,
    out: &mut W,
    format: OutputFormat,
) -> Result<ReplaySummary> {
    let mut summary = ReplaySummary::default();
    let mut clock = ReplayClock::default();

    for (index, line) in input.lines().enumerate() {
        let line_no = index + 1;
        let line = line.with_context(|| format!("Failed to read line {}", line_no))?;
        if line.trim().is_empty() {
            continue;
        }
        summary.lines += 1;

        match ReplayStep::parse(&line) {
            Ok(step) => apply_step(engine, &mut clock, step),
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "skipping replay line");
                summary.skipped += 1;
                continue;
            }
        }

        let report = engine.tick(clock.now);
        tracing::debug!(
            line = line_no,
            created = report.created.len(),
            updated = report.updated.len(),
            removed = report.removed.len(),
            "tick"
        );
        write_view(out, Some(line_no), &engine.view(), format)?;
    }

    Ok(summary)
}

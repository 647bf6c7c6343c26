//! Scripted recording: drive a whole capture session from a JSONL file.
//!
//! Each non-empty line is one `ScriptEvent`, for example
//! `{"type":"click","target":{"tag_name":"BUTTON","inner_text":"Save"}}`.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::capture::InteractionEvent;
use crate::coordinator::{CaptureCoordinator, CaptureOutcome};
use crate::errors::GuideError;
use crate::logging::append_run_log;
use crate::runtime::{Clock, ScriptedPage};
use crate::types::{ElementSnapshot, RecorderState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScriptEvent {
    Click { target: ElementSnapshot },
    Change { target: ElementSnapshot },
    PageReloaded,
    TabClosed,
}

pub fn parse_script(raw: &str) -> Result<Vec<ScriptEvent>, GuideError> {
    let mut events = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let event: ScriptEvent = serde_json::from_str(line)
            .map_err(|e| GuideError::Cli(format!("events line {}: {e}", idx + 1)))?;
        events.push(event);
    }
    Ok(events)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordSummary {
    pub appended: usize,
    pub skipped: usize,
    pub dropped_stale: usize,
    pub ignored: usize,
    pub tab_closed: bool,
    /// The session ended with a stop, so the guide goes to review.
    pub review_requested: bool,
    pub steps: usize,
}

/// Start a session, play `events` against `page`, then stop. The highlight
/// delay is honoured through `clock` after every event.
pub fn run_script(
    coordinator: &CaptureCoordinator,
    page: &ScriptedPage,
    clock: &dyn Clock,
    events: &[ScriptEvent],
) -> Result<RecordSummary, GuideError> {
    let mut summary = RecordSummary::default();
    let session = coordinator.start(page)?;
    append_run_log(
        "info",
        "script.started",
        json!({ "session": session.to_string(), "events": events.len() }),
    );

    for event in events {
        let outcome = match event {
            ScriptEvent::Click { target } => {
                Some(coordinator.dispatch(page, &InteractionEvent::click(target.clone()))?)
            }
            ScriptEvent::Change { target } => {
                Some(coordinator.dispatch(page, &InteractionEvent::change(target.clone()))?)
            }
            ScriptEvent::PageReloaded => {
                page.navigate();
                coordinator.page_reloaded(page)?;
                None
            }
            ScriptEvent::TabClosed => {
                coordinator.tab_closed()?;
                summary.tab_closed = true;
                None
            }
        };
        match outcome {
            Some(CaptureOutcome::Appended { .. }) => summary.appended += 1,
            Some(CaptureOutcome::Skipped { .. }) => summary.skipped += 1,
            Some(CaptureOutcome::DroppedStale) => summary.dropped_stale += 1,
            Some(CaptureOutcome::Ignored) => summary.ignored += 1,
            None => {}
        }

        if let Some(deadline) = coordinator.overlay_deadline()? {
            clock.sleep_until(deadline)?;
            coordinator.sweep_overlay(page)?;
        }
    }

    summary.steps = if coordinator.state()? == RecorderState::Recording {
        coordinator.stop(page)?
    } else {
        coordinator.ledger().len()?
    };
    summary.review_requested = coordinator.take_review_request()?;
    append_run_log(
        "info",
        "script.finished",
        json!({
            "session": session.to_string(),
            "appended": summary.appended,
            "skipped": summary.skipped,
            "ignored": summary.ignored,
            "steps": summary.steps,
        }),
    );
    Ok(summary)
}

//! Bridges page interactions to capture requests.
//!
//! A `CaptureEngine` belongs to one recording session. It registers two
//! capture-phase listeners at the document root (`click` and `change`) and
//! turns each qualifying event into a `CaptureRequest` carrying a redacted
//! title. Clicks on text-entry elements are left to the `change` path so a
//! single user action is never recorded twice.

use crate::logging::append_run_log;
use crate::runtime::PageHost;
use crate::title::{title_for, InteractionKind};
use crate::types::{BoundingBox, DomEventType, ElementSnapshot, SessionToken};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::{Duration, SystemTime};

pub const DEFAULT_OVERLAY_ID: &str = "stepwise-highlight-box";
pub const DEFAULT_HIGHLIGHT_MS: u64 = 300;
pub const OVERLAY_BORDER: &str = "3px solid red";
pub const OVERLAY_Z_INDEX: u32 = 99_999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerOwner {
    CaptureEngine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerSpec {
    pub event: DomEventType,
    pub capture: bool,
    pub owner: ListenerOwner,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HighlightOverlay {
    pub id: String,
    pub rect: BoundingBox,
    pub border: String,
    pub z_index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CaptureAction {
    CaptureStep,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub action: CaptureAction,
    pub title: String,
    pub session: SessionToken,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    #[serde(rename = "type")]
    pub event_type: DomEventType,
    pub target: ElementSnapshot,
}

impl InteractionEvent {
    pub fn click(target: ElementSnapshot) -> Self {
        Self {
            event_type: DomEventType::Click,
            target,
        }
    }

    pub fn change(target: ElementSnapshot) -> Self {
        Self {
            event_type: DomEventType::Change,
            target,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSettings {
    pub highlight: Duration,
    pub overlay_id: String,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            highlight: Duration::from_millis(DEFAULT_HIGHLIGHT_MS),
            overlay_id: DEFAULT_OVERLAY_ID.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct PendingOverlay {
    id: String,
    remove_at: SystemTime,
}

#[derive(Debug)]
pub struct CaptureEngine {
    session: SessionToken,
    settings: CaptureSettings,
    pending_overlay: Option<PendingOverlay>,
}

impl CaptureEngine {
    pub fn new(session: SessionToken, settings: CaptureSettings) -> Self {
        Self {
            session,
            settings,
            pending_overlay: None,
        }
    }

    pub fn session(&self) -> SessionToken {
        self.session
    }

    pub fn listener_specs() -> [ListenerSpec; 2] {
        [DomEventType::Click, DomEventType::Change].map(|event| ListenerSpec {
            event,
            capture: true,
            owner: ListenerOwner::CaptureEngine,
        })
    }

    /// Install the root listeners. Safe to call again after navigation or on
    /// an already-instrumented page; returns how many were newly installed.
    pub fn attach(&self, page: &dyn PageHost) -> usize {
        let installed = Self::listener_specs()
            .into_iter()
            .filter(|spec| page.install_listener(*spec))
            .count();
        append_run_log(
            "info",
            "capture.engine.attached",
            json!({
                "session": self.session.to_string(),
                "newly_installed": installed,
            }),
        );
        installed
    }

    pub fn on_event(
        &mut self,
        page: &dyn PageHost,
        event: &InteractionEvent,
        now: SystemTime,
    ) -> Option<CaptureRequest> {
        let target = &event.target;
        let title = match event.event_type {
            DomEventType::Click => {
                if target.id.as_deref() == Some(self.settings.overlay_id.as_str()) {
                    return self.ignore(event, "own_overlay");
                }
                if target.is_text_entry() {
                    return self.ignore(event, "text_entry_click");
                }
                let title = title_for(InteractionKind::Click, target);
                self.highlight(page, target.rect, now);
                title
            }
            DomEventType::Change => {
                if !target.is_text_entry() {
                    return self.ignore(event, "not_text_entry");
                }
                self.clear_overlay(page);
                title_for(InteractionKind::ValueChange, target)
            }
        };

        append_run_log(
            "debug",
            "capture.request.emitted",
            json!({
                "session": self.session.to_string(),
                "event": event.event_type.as_str(),
                "title": title,
            }),
        );
        Some(CaptureRequest {
            action: CaptureAction::CaptureStep,
            title,
            session: self.session,
        })
    }

    pub fn overlay_deadline(&self) -> Option<SystemTime> {
        self.pending_overlay.as_ref().map(|pending| pending.remove_at)
    }

    /// Remove the highlight once its delay has elapsed. Returns whether an
    /// overlay was taken down.
    pub fn sweep_overlay(&mut self, page: &dyn PageHost, now: SystemTime) -> bool {
        let due = self
            .pending_overlay
            .as_ref()
            .is_some_and(|pending| pending.remove_at <= now);
        if due {
            self.clear_overlay(page);
        }
        due
    }

    /// Remove any highlight immediately, regardless of its deadline.
    pub fn clear_overlay(&mut self, page: &dyn PageHost) {
        let Some(pending) = self.pending_overlay.take() else {
            return;
        };
        if let Err(error) = page.remove_overlay(&pending.id) {
            append_run_log(
                "debug",
                "capture.overlay.remove_skipped",
                json!({ "overlay_id": pending.id, "error": error.to_string() }),
            );
        }
    }

    fn highlight(&mut self, page: &dyn PageHost, rect: BoundingBox, now: SystemTime) {
        self.clear_overlay(page);
        let overlay = HighlightOverlay {
            id: self.settings.overlay_id.clone(),
            rect,
            border: OVERLAY_BORDER.to_string(),
            z_index: OVERLAY_Z_INDEX,
        };
        match page.show_overlay(&overlay) {
            Ok(()) => {
                self.pending_overlay = Some(PendingOverlay {
                    id: overlay.id,
                    remove_at: now + self.settings.highlight,
                });
            }
            Err(error) => {
                append_run_log(
                    "warn",
                    "capture.overlay.show_failed",
                    json!({ "error": error.to_string() }),
                );
            }
        }
    }

    fn ignore(&self, event: &InteractionEvent, reason: &str) -> Option<CaptureRequest> {
        append_run_log(
            "debug",
            "capture.event.ignored",
            json!({
                "session": self.session.to_string(),
                "event": event.event_type.as_str(),
                "tag": event.target.tag_name,
                "reason": reason,
            }),
        );
        None
    }
}

//! Owns the recording lifecycle and the path from capture request to ledger.
//!
//! Requests are served one at a time behind `capture_gate`. The session token
//! is checked twice: before the screenshot is taken, and again under the
//! state lock right before the append, so a request that outlives its
//! session never reaches the ledger.

use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use serde_json::json;

use crate::capture::{CaptureEngine, CaptureRequest, CaptureSettings, InteractionEvent};
use crate::errors::GuideError;
use crate::fsm::{RecorderEffect, RecorderEvent, RecorderFsm, RecordingSession};
use crate::ledger::StepLedger;
use crate::logging::append_run_log;
use crate::runtime::{lock, Clock, PageHost, ScreenCapture};
use crate::types::{RecorderState, SessionToken, Step};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Appended { index: usize },
    /// The request belonged to a session that is no longer recording.
    DroppedStale,
    /// The screenshot could not be taken; this step is lost.
    Skipped { reason: String },
    /// The engine did not turn the event into a request.
    Ignored,
}

struct CoordinatorState {
    fsm: RecorderFsm,
    engine: Option<CaptureEngine>,
    review_requested: bool,
}

pub struct CaptureCoordinator {
    state: Mutex<CoordinatorState>,
    capture_gate: Mutex<()>,
    ledger: Arc<StepLedger>,
    screen_capture: Arc<dyn ScreenCapture>,
    clock: Arc<dyn Clock>,
    settings: CaptureSettings,
}

impl CaptureCoordinator {
    pub fn new(
        ledger: Arc<StepLedger>,
        screen_capture: Arc<dyn ScreenCapture>,
        clock: Arc<dyn Clock>,
        settings: CaptureSettings,
    ) -> Self {
        Self {
            state: Mutex::new(CoordinatorState {
                fsm: RecorderFsm::default(),
                engine: None,
                review_requested: false,
            }),
            capture_gate: Mutex::new(()),
            ledger,
            screen_capture,
            clock,
            settings,
        }
    }

    pub fn ledger(&self) -> &Arc<StepLedger> {
        &self.ledger
    }

    pub fn state(&self) -> Result<RecorderState, GuideError> {
        Ok(lock(&self.state, "coordinator")?.fsm.state())
    }

    pub fn session(&self) -> Result<RecordingSession, GuideError> {
        Ok(lock(&self.state, "coordinator")?.fsm.session())
    }

    /// Begin a new session: the guide is emptied and a fresh token issued.
    pub fn start(&self, page: &dyn PageHost) -> Result<SessionToken, GuideError> {
        let mut state = lock(&self.state, "coordinator")?;
        let token = self.transition(&mut state, RecorderEvent::Start, Some(page))?;
        append_run_log(
            "info",
            "coordinator.session.started",
            json!({ "session": token.to_string() }),
        );
        Ok(token)
    }

    /// End the current session. Returns how many steps the guide holds, for
    /// the caller to open the review surface with.
    pub fn stop(&self, page: &dyn PageHost) -> Result<usize, GuideError> {
        let mut state = lock(&self.state, "coordinator")?;
        let token = self.transition(&mut state, RecorderEvent::Stop, Some(page))?;
        drop(state);
        let steps = self.ledger.len()?;
        append_run_log(
            "info",
            "coordinator.session.stopped",
            json!({ "session": token.to_string(), "steps": steps }),
        );
        Ok(steps)
    }

    /// True once after a stop that should hand the guide to the review
    /// surface. A tab close or a new session withdraws the request.
    pub fn take_review_request(&self) -> Result<bool, GuideError> {
        let mut state = lock(&self.state, "coordinator")?;
        Ok(std::mem::take(&mut state.review_requested))
    }

    /// The page navigated. Re-attach the engine when a session is running;
    /// returns the number of listeners that had to be installed again.
    pub fn page_reloaded(&self, page: &dyn PageHost) -> Result<usize, GuideError> {
        let mut state = lock(&self.state, "coordinator")?;
        let effects = state.fsm.apply(RecorderEvent::PageReloaded)?;
        let mut installed = 0;
        for effect in effects {
            if effect == RecorderEffect::AttachEngine {
                if let Some(engine) = state.engine.as_mut() {
                    // The old document took the overlay with it.
                    engine.clear_overlay(page);
                    installed += engine.attach(page);
                }
            }
        }
        append_run_log(
            "debug",
            "coordinator.page.reloaded",
            json!({
                "state": state.fsm.state().as_str(),
                "listeners_installed": installed,
            }),
        );
        Ok(installed)
    }

    /// The recorded tab went away. Recording stops without opening review.
    pub fn tab_closed(&self) -> Result<(), GuideError> {
        let mut state = lock(&self.state, "coordinator")?;
        let token = self.transition(&mut state, RecorderEvent::TabClosed, None)?;
        append_run_log(
            "info",
            "coordinator.tab.closed",
            json!({ "session": token.to_string() }),
        );
        Ok(())
    }

    /// Feed one page event through the engine and, if it qualifies, capture it.
    pub fn dispatch(
        &self,
        page: &dyn PageHost,
        event: &InteractionEvent,
    ) -> Result<CaptureOutcome, GuideError> {
        let request = {
            let mut state = lock(&self.state, "coordinator")?;
            let Some(engine) = state.engine.as_mut() else {
                return Ok(CaptureOutcome::Ignored);
            };
            engine.on_event(page, event, self.clock.now())
        };
        match request {
            Some(request) => self.handle_capture(request),
            None => Ok(CaptureOutcome::Ignored),
        }
    }

    pub fn handle_capture(&self, request: CaptureRequest) -> Result<CaptureOutcome, GuideError> {
        let _gate = lock(&self.capture_gate, "capture gate")?;

        if !self.accepts(request.session)? {
            return Ok(self.drop_stale(&request));
        }

        let screenshot = match self.screen_capture.capture_visible() {
            Ok(screenshot) => screenshot,
            Err(GuideError::Capture(reason)) => {
                append_run_log(
                    "warn",
                    "capture.screenshot.failed",
                    json!({
                        "session": request.session.to_string(),
                        "title": request.title,
                        "reason": reason,
                    }),
                );
                return Ok(CaptureOutcome::Skipped { reason });
            }
            Err(other) => return Err(other),
        };

        let state = lock(&self.state, "coordinator")?;
        if !state.fsm.accepts(request.session) {
            return Ok(self.drop_stale(&request));
        }
        let index = self
            .ledger
            .append(Step::captured(request.title, screenshot))?;
        drop(state);
        Ok(CaptureOutcome::Appended { index })
    }

    /// Take down an expired highlight. Returns whether one was removed.
    pub fn sweep_overlay(&self, page: &dyn PageHost) -> Result<bool, GuideError> {
        let mut state = lock(&self.state, "coordinator")?;
        let now = self.clock.now();
        Ok(state
            .engine
            .as_mut()
            .is_some_and(|engine| engine.sweep_overlay(page, now)))
    }

    pub fn overlay_deadline(&self) -> Result<Option<SystemTime>, GuideError> {
        let state = lock(&self.state, "coordinator")?;
        Ok(state
            .engine
            .as_ref()
            .and_then(CaptureEngine::overlay_deadline))
    }

    fn accepts(&self, token: SessionToken) -> Result<bool, GuideError> {
        Ok(lock(&self.state, "coordinator")?.fsm.accepts(token))
    }

    fn drop_stale(&self, request: &CaptureRequest) -> CaptureOutcome {
        append_run_log(
            "info",
            "capture.request.dropped_stale",
            json!({ "session": request.session.to_string() }),
        );
        CaptureOutcome::DroppedStale
    }

    /// Apply `event` to a copy of the state machine, run its effects, and
    /// commit the new state only when every effect succeeded. Effects are
    /// ordered so that only the first one can fail; an error leaves the
    /// engine and the session exactly as they were.
    fn transition(
        &self,
        state: &mut CoordinatorState,
        event: RecorderEvent,
        page: Option<&dyn PageHost>,
    ) -> Result<SessionToken, GuideError> {
        let mut fsm = state.fsm.clone();
        let effects = fsm.apply(event)?;
        let mut open_review = false;
        for effect in effects {
            match effect {
                RecorderEffect::DetachEngine => {
                    if let (Some(mut engine), Some(page)) = (state.engine.take(), page) {
                        engine.clear_overlay(page);
                    }
                }
                RecorderEffect::ClearLedger => self.ledger.clear()?,
                RecorderEffect::AttachEngine => {
                    let engine = CaptureEngine::new(fsm.session().token, self.settings.clone());
                    if let Some(page) = page {
                        engine.attach(page);
                    }
                    state.engine = Some(engine);
                }
                RecorderEffect::OpenReview => open_review = true,
            }
        }
        let token = fsm.session().token;
        state.fsm = fsm;
        state.review_requested = open_review;
        Ok(token)
    }
}

use crate::errors::GuideError;
use crate::types::{RecorderState, SessionToken};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderEvent {
    Start,
    Stop,
    PageReloaded,
    TabClosed,
}

impl RecorderEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::PageReloaded => "page_reloaded",
            Self::TabClosed => "tab_closed",
        }
    }
}

/// Side effects the owner of the state machine must carry out, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderEffect {
    DetachEngine,
    ClearLedger,
    AttachEngine,
    OpenReview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingSession {
    pub active: bool,
    pub token: SessionToken,
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self {
            active: false,
            token: SessionToken(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderFsm {
    state: RecorderState,
    session: RecordingSession,
}

impl Default for RecorderFsm {
    fn default() -> Self {
        Self {
            state: RecorderState::Idle,
            session: RecordingSession::default(),
        }
    }
}

impl RecorderFsm {
    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn session(&self) -> RecordingSession {
        self.session
    }

    /// True only for the token of the session that is recording right now.
    pub fn accepts(&self, token: SessionToken) -> bool {
        self.session.active && self.session.token == token
    }

    pub fn apply(&mut self, event: RecorderEvent) -> Result<Vec<RecorderEffect>, GuideError> {
        use RecorderEffect as E;

        let next = validate_transition(self.state, event)?;
        let recording = self.state == RecorderState::Recording;
        let effects = match event {
            RecorderEvent::Start => {
                // Token values are never reused, so requests from any earlier
                // session stay stale for good.
                self.session = RecordingSession {
                    active: true,
                    token: SessionToken(self.session.token.0.saturating_add(1)),
                };
                // The ledger clear is the only effect that can fail, so it
                // runs before the running engine is touched.
                if recording {
                    vec![E::ClearLedger, E::DetachEngine, E::AttachEngine]
                } else {
                    vec![E::ClearLedger, E::AttachEngine]
                }
            }
            RecorderEvent::Stop => {
                self.session.active = false;
                vec![E::DetachEngine, E::OpenReview]
            }
            RecorderEvent::TabClosed => {
                self.session.active = false;
                if recording {
                    vec![E::DetachEngine]
                } else {
                    Vec::new()
                }
            }
            RecorderEvent::PageReloaded => {
                if recording {
                    vec![E::AttachEngine]
                } else {
                    Vec::new()
                }
            }
        };
        self.state = next;
        Ok(effects)
    }
}

pub fn validate_transition(
    from: RecorderState,
    event: RecorderEvent,
) -> Result<RecorderState, GuideError> {
    use RecorderEvent as Ev;
    use RecorderState as S;

    match (from, event) {
        (_, Ev::Start) => Ok(S::Recording),
        (S::Recording, Ev::Stop) => Ok(S::Idle),
        (S::Idle, Ev::Stop) => Err(GuideError::InvalidTransition(format!(
            "illegal transition: {} --{}-->",
            from.as_str(),
            event.as_str()
        ))),
        (_, Ev::TabClosed) => Ok(S::Idle),
        (state, Ev::PageReloaded) => Ok(state),
    }
}

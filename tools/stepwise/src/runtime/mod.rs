use crate::capture::{HighlightOverlay, ListenerSpec};
use crate::errors::GuideError;
use crate::types::{DomEventType, ScreenshotRef};
use base64::Engine as _;
use std::collections::{HashMap, VecDeque};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
    fn sleep_until(&self, deadline: SystemTime) -> Result<(), GuideError>;
}

pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String, GuideError>;
    fn write_string(&self, path: &Path, contents: &str) -> Result<(), GuideError>;
    fn create_dir_all(&self, path: &Path) -> Result<(), GuideError>;
    fn exists(&self, path: &Path) -> bool;
}

pub trait Terminal: Send + Sync {
    fn stdin_is_tty(&self) -> bool;
    fn write_line(&self, line: &str) -> Result<(), GuideError>;
    fn draw(&self, frame: &str) -> Result<(), GuideError>;
    /// Ask a yes/no question; anything but an explicit yes is a no.
    fn confirm(&self, prompt: &str) -> Result<bool, GuideError>;
}

/// Captures the visible viewport of the page being recorded.
pub trait ScreenCapture: Send + Sync {
    fn capture_visible(&self) -> Result<ScreenshotRef, GuideError>;
}

/// The document a capture engine is attached to.
pub trait PageHost: Send + Sync {
    /// Register a root listener. Returns `false` when an identical
    /// registration already exists, in which case nothing changes.
    fn install_listener(&self, listener: ListenerSpec) -> bool;
    fn show_overlay(&self, overlay: &HighlightOverlay) -> Result<(), GuideError>;
    fn remove_overlay(&self, overlay_id: &str) -> Result<(), GuideError>;
}

pub(crate) fn lock<'a, T>(
    mutex: &'a Mutex<T>,
    what: &str,
) -> Result<MutexGuard<'a, T>, GuideError> {
    mutex
        .lock()
        .map_err(|_| GuideError::Io(format!("{what} lock poisoned")))
}

pub struct ProductionClock;

impl Clock for ProductionClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }

    fn sleep_until(&self, deadline: SystemTime) -> Result<(), GuideError> {
        let now = SystemTime::now();
        if let Ok(duration) = deadline.duration_since(now) {
            std::thread::sleep(duration);
        }
        Ok(())
    }
}

pub struct ProductionFileSystem;

impl FileSystem for ProductionFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, GuideError> {
        std::fs::read_to_string(path).map_err(|e| GuideError::Io(e.to_string()))
    }

    fn write_string(&self, path: &Path, contents: &str) -> Result<(), GuideError> {
        std::fs::write(path, contents).map_err(|e| GuideError::Io(e.to_string()))
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), GuideError> {
        std::fs::create_dir_all(path).map_err(|e| GuideError::Io(e.to_string()))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

pub struct ProductionTerminal;

impl Terminal for ProductionTerminal {
    fn stdin_is_tty(&self) -> bool {
        std::io::IsTerminal::is_terminal(&std::io::stdin())
    }

    fn write_line(&self, line: &str) -> Result<(), GuideError> {
        use std::io::Write;
        let mut out = std::io::stdout();
        writeln!(out, "{line}").map_err(|e| GuideError::Io(e.to_string()))
    }

    fn draw(&self, frame: &str) -> Result<(), GuideError> {
        self.write_line(frame)
    }

    fn confirm(&self, prompt: &str) -> Result<bool, GuideError> {
        use std::io::Write;
        let mut out = std::io::stdout();
        write!(out, "{prompt} [y/N] ").map_err(|e| GuideError::Io(e.to_string()))?;
        out.flush().map_err(|e| GuideError::Io(e.to_string()))?;
        let mut answer = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut answer)
            .map_err(|e| GuideError::Io(e.to_string()))?;
        Ok(is_affirmative(&answer))
    }
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Reads a screenshot from an image file and embeds it as a data URL.
/// With no path configured there is no visible tab to capture.
pub struct FileScreenCapture {
    path: Option<PathBuf>,
}

impl FileScreenCapture {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

impl ScreenCapture for FileScreenCapture {
    fn capture_visible(&self) -> Result<ScreenshotRef, GuideError> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| GuideError::Capture("no visible tab to capture".to_string()))?;
        let bytes = std::fs::read(path)
            .map_err(|e| GuideError::Capture(format!("{}: {e}", path.display())))?;
        Ok(data_url(image_mime_type(path), &bytes))
    }
}

pub fn image_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        _ => "image/png",
    }
}

pub fn data_url(mime_type: &str, bytes: &[u8]) -> ScreenshotRef {
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    ScreenshotRef::new(format!("data:{mime_type};base64,{encoded}"))
}

pub struct ProductionRuntime {
    pub clock: Arc<dyn Clock>,
    pub file_system: Arc<dyn FileSystem>,
    pub terminal: Arc<dyn Terminal>,
    pub screen_capture: Arc<dyn ScreenCapture>,
}

impl ProductionRuntime {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(ProductionClock),
            file_system: Arc::new(ProductionFileSystem),
            terminal: Arc::new(ProductionTerminal),
            screen_capture: Arc::new(FileScreenCapture::new(None)),
        }
    }
}

impl Default for ProductionRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct PageState {
    listeners: Vec<ListenerSpec>,
    overlays: Vec<HighlightOverlay>,
    shown_total: usize,
    navigations: usize,
}

/// In-process document used for scripted recordings and tests. Navigation
/// replaces the document, dropping its listeners and overlays.
#[derive(Default, Clone)]
pub struct ScriptedPage {
    state: Arc<Mutex<PageState>>,
}

impl ScriptedPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn navigate(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.listeners.clear();
            state.overlays.clear();
            state.navigations += 1;
        }
    }

    pub fn listeners(&self) -> Vec<ListenerSpec> {
        self.state
            .lock()
            .map(|state| state.listeners.clone())
            .unwrap_or_default()
    }

    pub fn listeners_for(&self, event: DomEventType) -> Vec<ListenerSpec> {
        self.listeners()
            .into_iter()
            .filter(|listener| listener.event == event)
            .collect()
    }

    pub fn visible_overlays(&self) -> Vec<HighlightOverlay> {
        self.state
            .lock()
            .map(|state| state.overlays.clone())
            .unwrap_or_default()
    }

    pub fn overlays_shown(&self) -> usize {
        self.state.lock().map(|state| state.shown_total).unwrap_or(0)
    }

    pub fn navigations(&self) -> usize {
        self.state.lock().map(|state| state.navigations).unwrap_or(0)
    }
}

impl PageHost for ScriptedPage {
    fn install_listener(&self, listener: ListenerSpec) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        if state.listeners.contains(&listener) {
            return false;
        }
        state.listeners.push(listener);
        true
    }

    fn show_overlay(&self, overlay: &HighlightOverlay) -> Result<(), GuideError> {
        let mut state = lock(&self.state, "page")?;
        state.overlays.push(overlay.clone());
        state.shown_total += 1;
        Ok(())
    }

    fn remove_overlay(&self, overlay_id: &str) -> Result<(), GuideError> {
        let mut state = lock(&self.state, "page")?;
        let Some(position) = state.overlays.iter().position(|o| o.id == overlay_id) else {
            return Err(GuideError::Io(format!("overlay {overlay_id} is not attached")));
        };
        state.overlays.remove(position);
        Ok(())
    }
}

#[derive(Clone)]
pub struct FakeClock {
    now: Arc<Mutex<SystemTime>>,
    sleeps: Arc<Mutex<Vec<SystemTime>>>,
}

impl FakeClock {
    pub fn new(now: SystemTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
            sleeps: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }

    pub fn sleeps(&self) -> Vec<SystemTime> {
        self.sleeps.lock().expect("sleep lock").clone()
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(SystemTime::UNIX_EPOCH)
    }
}

impl Clock for FakeClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().expect("clock lock")
    }

    fn sleep_until(&self, deadline: SystemTime) -> Result<(), GuideError> {
        self.sleeps.lock().expect("sleep lock").push(deadline);
        let mut now = self.now.lock().expect("clock lock");
        if deadline > *now {
            *now = deadline;
        }
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct FakeFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, String>>>,
    dirs: Arc<Mutex<Vec<PathBuf>>>,
    fail_next: Arc<Mutex<Option<GuideError>>>,
}

impl FakeFileSystem {
    pub fn with_file(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let fs = Self::default();
        fs.files
            .lock()
            .expect("files lock")
            .insert(path.into(), contents.into());
        fs
    }

    pub fn set_fail_next(&self, error: GuideError) {
        *self.fail_next.lock().expect("fail lock") = Some(error);
    }

    pub fn file(&self, path: impl AsRef<Path>) -> Option<String> {
        self.files
            .lock()
            .expect("files lock")
            .get(path.as_ref())
            .cloned()
    }

    fn maybe_fail(&self) -> Result<(), GuideError> {
        if let Some(err) = self.fail_next.lock().expect("fail lock").take() {
            return Err(err);
        }
        Ok(())
    }
}

impl FileSystem for FakeFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, GuideError> {
        self.maybe_fail()?;
        self.files
            .lock()
            .expect("files lock")
            .get(path)
            .cloned()
            .ok_or_else(|| GuideError::Io(format!("missing file {}", path.display())))
    }

    fn write_string(&self, path: &Path, contents: &str) -> Result<(), GuideError> {
        self.maybe_fail()?;
        self.files
            .lock()
            .expect("files lock")
            .insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), GuideError> {
        self.maybe_fail()?;
        self.dirs
            .lock()
            .expect("dirs lock")
            .push(path.to_path_buf());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().expect("files lock").contains_key(path)
    }
}

#[derive(Default, Clone)]
pub struct FakeTerminal {
    pub is_tty: bool,
    writes: Arc<Mutex<Vec<String>>>,
    draws: Arc<Mutex<Vec<String>>>,
    answers: Arc<Mutex<VecDeque<bool>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl FakeTerminal {
    pub fn new(is_tty: bool) -> Self {
        Self {
            is_tty,
            ..Self::default()
        }
    }

    pub fn push_answer(&self, answer: bool) {
        self.answers.lock().expect("answers lock").push_back(answer);
    }

    pub fn written_lines(&self) -> Vec<String> {
        self.writes.lock().expect("writes lock").clone()
    }

    pub fn drawn_frames(&self) -> Vec<String> {
        self.draws.lock().expect("draw lock").clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }
}

impl Terminal for FakeTerminal {
    fn stdin_is_tty(&self) -> bool {
        self.is_tty
    }

    fn write_line(&self, line: &str) -> Result<(), GuideError> {
        self.writes
            .lock()
            .expect("writes lock")
            .push(line.to_string());
        Ok(())
    }

    fn draw(&self, frame: &str) -> Result<(), GuideError> {
        self.draws
            .lock()
            .expect("draw lock")
            .push(frame.to_string());
        Ok(())
    }

    fn confirm(&self, prompt: &str) -> Result<bool, GuideError> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(prompt.to_string());
        Ok(self
            .answers
            .lock()
            .expect("answers lock")
            .pop_front()
            .unwrap_or(false))
    }
}

/// Returns queued results in order, then a fixed placeholder image.
#[derive(Default, Clone)]
pub struct FakeScreenCapture {
    responses: Arc<Mutex<VecDeque<Result<ScreenshotRef, GuideError>>>>,
    calls: Arc<Mutex<usize>>,
}

pub const FAKE_SCREENSHOT: &str = "data:image/png;base64,iVBORw0KGgo=";

impl FakeScreenCapture {
    pub fn push_response(&self, response: Result<ScreenshotRef, GuideError>) {
        self.responses
            .lock()
            .expect("responses lock")
            .push_back(response);
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().expect("calls lock")
    }
}

impl ScreenCapture for FakeScreenCapture {
    fn capture_visible(&self) -> Result<ScreenshotRef, GuideError> {
        *self.calls.lock().expect("calls lock") += 1;
        self.responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .unwrap_or_else(|| Ok(ScreenshotRef::new(FAKE_SCREENSHOT)))
    }
}

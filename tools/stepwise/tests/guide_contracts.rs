use std::sync::Arc;

use stepwise::capture::{CaptureAction, CaptureRequest, CaptureSettings, InteractionEvent};
use stepwise::coordinator::{CaptureCoordinator, CaptureOutcome};
use stepwise::errors::GuideError;
use stepwise::export::render;
use stepwise::ledger::StepLedger;
use stepwise::redaction::{is_sensitive, FieldDescriptor};
use stepwise::runtime::{FakeClock, FakeScreenCapture, ScriptedPage};
use stepwise::title::{title_for, InteractionKind, SENSITIVE_CLICK_TITLE, SENSITIVE_TYPED_TITLE};
use stepwise::types::{ElementSnapshot, ExportFormat, ScreenshotRef, Step};
use tempfile::TempDir;

fn ledger_with(titles: &[&str]) -> (StepLedger, TempDir) {
    let dir = TempDir::new().expect("tempdir");
    let ledger = StepLedger::open(dir.path().join("guide.sqlite")).expect("ledger");
    for title in titles {
        ledger
            .append(Step::captured(*title, ScreenshotRef::new("data:,")))
            .expect("append");
    }
    (ledger, dir)
}

fn titles(ledger: &StepLedger) -> Vec<String> {
    ledger
        .list_steps()
        .expect("list")
        .into_iter()
        .map(|step| step.title)
        .collect()
}

#[test]
fn sensitivity_is_decided_by_type_name_and_id_only() {
    let field = |field_type, name, id| FieldDescriptor {
        field_type,
        name,
        id,
    };
    assert!(is_sensitive(&field("password", "", "")));
    assert!(is_sensitive(&field("text", "cc-cvv", "")));
    assert!(is_sensitive(&field("text", "", "Security_Code")));
    assert!(!is_sensitive(&field("text", "username", "login")));
}

#[test]
fn sensitive_values_never_reach_titles() {
    let mut element = ElementSnapshot::new("INPUT");
    element.name = Some("ssn".to_string());
    element.value = Some("078-05-1120".to_string());
    element.placeholder = Some("078-05-1120".to_string());

    assert_eq!(
        title_for(InteractionKind::ValueChange, &element),
        SENSITIVE_TYPED_TITLE
    );
    assert_eq!(title_for(InteractionKind::Click, &element), SENSITIVE_CLICK_TITLE);
}

#[test]
fn move_first_to_last_then_back() {
    let (ledger, _dir) = ledger_with(&["s0", "s1", "s2"]);
    ledger.move_step(0, 2).expect("move");
    assert_eq!(titles(&ledger), ["s1", "s2", "s0"]);
    ledger.move_step(2, 0).expect("move back");
    assert_eq!(titles(&ledger), ["s0", "s1", "s2"]);
}

#[test]
fn delete_contract() {
    let (ledger, _dir) = ledger_with(&["A", "B", "C"]);
    assert!(matches!(
        ledger.delete(5),
        Err(GuideError::OutOfRange { index: 5, len: 3 })
    ));
    assert_eq!(titles(&ledger), ["A", "B", "C"]);

    let removed = ledger.delete(1).expect("delete");
    assert_eq!(titles(&ledger), ["A", "C"]);
    assert_eq!(ledger.append(removed).expect("append"), 2);
    assert_eq!(titles(&ledger), ["A", "C", "B"]);
}

#[test]
fn export_examples() {
    let steps = [Step::captured("<b>", ScreenshotRef::new("data:,"))];
    let html = render("My Guide!! 2024", &steps, ExportFormat::Html);
    assert_eq!(html.filename, "My-Guide-2024.html");
    assert!(html.content.contains("&lt;b&gt;"));

    let md = render("My Guide!! 2024", &steps, ExportFormat::Markdown);
    assert_eq!(md.filename, "My-Guide-2024.md");
    assert!(md.content.contains("## Step 1: <b>"));
    assert_eq!(md, render("My Guide!! 2024", &steps, ExportFormat::Markdown));
}

#[test]
fn stale_session_cannot_append() {
    let dir = TempDir::new().expect("tempdir");
    let ledger = Arc::new(StepLedger::open(dir.path().join("guide.sqlite")).expect("ledger"));
    let capture = FakeScreenCapture::default();
    let coordinator = CaptureCoordinator::new(
        ledger,
        Arc::new(capture.clone()),
        Arc::new(FakeClock::default()),
        CaptureSettings::default(),
    );
    let page = ScriptedPage::new();

    let first = coordinator.start(&page).expect("start");
    let mut button = ElementSnapshot::new("BUTTON");
    button.inner_text = Some("Next".to_string());
    assert_eq!(
        coordinator
            .dispatch(&page, &InteractionEvent::click(button))
            .expect("dispatch"),
        CaptureOutcome::Appended { index: 0 }
    );

    coordinator.start(&page).expect("new session");
    let late = CaptureRequest {
        action: CaptureAction::CaptureStep,
        title: "from the old session".to_string(),
        session: first,
    };
    assert_eq!(
        coordinator.handle_capture(late).expect("handle"),
        CaptureOutcome::DroppedStale
    );
    assert!(coordinator.ledger().is_empty().expect("empty"));
    assert_eq!(capture.calls(), 1);
}

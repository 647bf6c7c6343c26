use ratatui::backend::TestBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, Paragraph};
use ratatui::Terminal as FrameTerminal;
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::errors::GuideError;
use crate::ledger::StepLedger;
use crate::logging::append_run_log;
use crate::runtime::Terminal;
use crate::types::{ExportFormat, ScreenshotRef, Step};

pub const EMPTY_GUIDE_MESSAGE: &str = "No steps recorded yet.";
const DESCRIPTION_PREVIEW_CHARS: usize = 48;
const FINGERPRINT_HEX_CHARS: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyBinding {
    pub key: char,
    pub action: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewAction {
    Quit,
    SelectNext,
    SelectPrevious,
    MoveUp,
    MoveDown,
    Delete,
    ExportHtml,
    ExportMarkdown,
}

pub const REVIEW_BINDINGS: [KeyBinding; 8] = [
    KeyBinding {
        key: 'j',
        action: "next",
    },
    KeyBinding {
        key: 'k',
        action: "previous",
    },
    KeyBinding {
        key: 'K',
        action: "move up",
    },
    KeyBinding {
        key: 'J',
        action: "move down",
    },
    KeyBinding {
        key: 'd',
        action: "delete",
    },
    KeyBinding {
        key: 'h',
        action: "export html",
    },
    KeyBinding {
        key: 'm',
        action: "export markdown",
    },
    KeyBinding {
        key: 'q',
        action: "quit",
    },
];

pub fn handle_key(key: char) -> Option<ReviewAction> {
    match key {
        'q' => Some(ReviewAction::Quit),
        'j' => Some(ReviewAction::SelectNext),
        'k' => Some(ReviewAction::SelectPrevious),
        'K' => Some(ReviewAction::MoveUp),
        'J' => Some(ReviewAction::MoveDown),
        'd' => Some(ReviewAction::Delete),
        'h' => Some(ReviewAction::ExportHtml),
        'm' => Some(ReviewAction::ExportMarkdown),
        _ => None,
    }
}

pub fn controls_legend() -> String {
    let parts = REVIEW_BINDINGS
        .iter()
        .map(|binding| format!("{} {}", binding.key, binding.action))
        .collect::<Vec<_>>();
    format!("Keys: {}", parts.join("  "))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewOutcome {
    Continue,
    Quit,
    Export(ExportFormat),
}

/// Selection state of an open review surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReviewCursor {
    pub selected: usize,
}

impl ReviewCursor {
    pub fn apply(
        &mut self,
        action: ReviewAction,
        ledger: &StepLedger,
        terminal: &dyn Terminal,
    ) -> Result<ReviewOutcome, GuideError> {
        let len = ledger.len()?;
        match action {
            ReviewAction::Quit => return Ok(ReviewOutcome::Quit),
            ReviewAction::ExportHtml => return Ok(ReviewOutcome::Export(ExportFormat::Html)),
            ReviewAction::ExportMarkdown => {
                return Ok(ReviewOutcome::Export(ExportFormat::Markdown))
            }
            ReviewAction::SelectNext => {
                if self.selected + 1 < len {
                    self.selected += 1;
                }
            }
            ReviewAction::SelectPrevious => {
                self.selected = self.selected.saturating_sub(1);
            }
            ReviewAction::MoveUp => {
                if self.selected > 0 && self.selected < len {
                    ledger.move_step(self.selected, self.selected - 1)?;
                    self.selected -= 1;
                }
            }
            ReviewAction::MoveDown => {
                if self.selected + 1 < len {
                    ledger.move_step(self.selected, self.selected + 1)?;
                    self.selected += 1;
                }
            }
            ReviewAction::Delete => {
                if self.selected < len
                    && terminal.confirm(&format!(
                        "Are you sure you want to delete Step {}?",
                        self.selected + 1
                    ))?
                {
                    ledger.delete(self.selected)?;
                    self.selected = self.selected.min(len.saturating_sub(2));
                }
            }
        }
        append_run_log(
            "debug",
            "review.action.applied",
            json!({ "action": format!("{action:?}"), "selected": self.selected }),
        );
        Ok(ReviewOutcome::Continue)
    }
}

pub fn screenshot_fingerprint(screenshot: &ScreenshotRef) -> String {
    let mut digest = Sha256::new();
    digest.update(screenshot.as_str().as_bytes());
    let bytes = digest.finalize();
    let mut out = String::with_capacity(FINGERPRINT_HEX_CHARS);
    for byte in bytes.iter().take(FINGERPRINT_HEX_CHARS / 2) {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

pub fn render_review(steps: &[Step], width: u16, height: u16) -> Result<String, GuideError> {
    render_review_with_cursor(steps, None, width, height)
}

pub fn render_review_with_cursor(
    steps: &[Step],
    selected: Option<usize>,
    width: u16,
    height: u16,
) -> Result<String, GuideError> {
    let backend = TestBackend::new(width, height);
    let mut terminal = FrameTerminal::new(backend).map_err(|e| GuideError::Io(e.to_string()))?;
    terminal
        .draw(|frame| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Min(3), Constraint::Length(3)])
                .split(frame.area());

            let block = Block::default()
                .borders(Borders::ALL)
                .title(format!("Guide ({} steps)", steps.len()));
            if steps.is_empty() {
                frame.render_widget(Paragraph::new(EMPTY_GUIDE_MESSAGE).block(block), chunks[0]);
            } else {
                let items = steps
                    .iter()
                    .enumerate()
                    .map(|(index, step)| step_item(index, step, selected == Some(index)))
                    .collect::<Vec<_>>();
                frame.render_widget(List::new(items).block(block), chunks[0]);
            }

            frame.render_widget(
                Paragraph::new(controls_legend())
                    .block(Block::default().borders(Borders::ALL).title("Controls")),
                chunks[1],
            );
        })
        .map_err(|e| GuideError::Io(e.to_string()))?;

    let mut out = String::new();
    let buffer = terminal.backend().buffer();
    for y in 0..height {
        for x in 0..width {
            out.push_str(buffer[(x, y)].symbol());
        }
        out.push('\n');
    }
    Ok(out)
}

fn step_item(index: usize, step: &Step, selected: bool) -> ListItem<'static> {
    let marker = if selected { "> " } else { "  " };
    let header = Line::from(vec![
        Span::raw(marker),
        Span::styled(
            format!("Step {}", index + 1),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(": {}", step.title)),
    ]);
    let detail = Line::from(vec![
        Span::raw("    "),
        Span::styled(
            format!("[{}]", screenshot_fingerprint(&step.screenshot)),
            Style::default().fg(Color::DarkGray),
        ),
        Span::raw(format!(" {}", description_preview(&step.description))),
    ]);
    ListItem::new(vec![header, detail])
}

fn description_preview(description: &str) -> String {
    let flat = description.replace('\n', " ");
    if flat.chars().count() <= DESCRIPTION_PREVIEW_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(DESCRIPTION_PREVIEW_CHARS).collect();
    format!("{cut}...")
}

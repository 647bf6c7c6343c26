pub mod capture;
pub mod config;
pub mod coordinator;
pub mod errors;
pub mod export;
pub mod fsm;
pub mod ledger;
pub mod log_retention;
pub mod logging;
pub mod redaction;
pub mod review;
pub mod runtime;
pub mod script;
pub mod title;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use capture::CaptureSettings;
use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand, ValueEnum};
use config::{load_config, AppConfig, CliOverrides, RuntimeScope};
use coordinator::CaptureCoordinator;
use errors::GuideError;
use export::export_guide;
use ledger::{LedgerOptions, StepLedger};
use logging::{append_run_log, init_run_logger, structured_fallback_line, JsonlLogger};
use review::{handle_key, render_review_with_cursor, ReviewCursor, ReviewOutcome};
use runtime::{FileScreenCapture, ProductionRuntime, ScreenCapture, ScriptedPage};
use script::{parse_script, run_script};
use serde_json::json;
use types::ExportFormat;

const REVIEW_WIDTH: u16 = 100;
const REVIEW_HEIGHT: u16 = 30;

#[derive(Debug, Clone, Parser)]
#[command(name = "stepwise")]
#[command(about = "Record page interactions into an illustrated step-by-step guide")]
pub struct Cli {
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub working_dir: Option<PathBuf>,
    #[arg(long = "db")]
    pub db_path: Option<PathBuf>,
    #[arg(long = "log")]
    pub log_path: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Replay a JSONL interaction script as one recording session.
    Record {
        #[arg(long)]
        events: PathBuf,
        #[arg(long)]
        screenshot: Option<PathBuf>,
    },
    /// Print the recorded steps.
    List,
    /// Show the review frame, optionally applying a sequence of keys.
    Review {
        #[arg(long, default_value = "")]
        keys: String,
    },
    EditTitle {
        step: usize,
        title: String,
    },
    EditDescription {
        step: usize,
        description: String,
    },
    Delete {
        step: usize,
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    Move {
        from: usize,
        to: usize,
    },
    Clear,
    Export {
        #[arg(long)]
        name: Option<String>,
        #[arg(long, value_enum)]
        format: CliFormat,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliFormat {
    Html,
    Markdown,
}

impl From<CliFormat> for ExportFormat {
    fn from(value: CliFormat) -> Self {
        match value {
            CliFormat::Html => ExportFormat::Html,
            CliFormat::Markdown => ExportFormat::Markdown,
        }
    }
}

pub fn run() -> Result<i32, GuideError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let cwd = std::env::current_dir().map_err(|e| GuideError::Io(e.to_string()))?;
    let runtime = ProductionRuntime::new();
    run_with_runtime(&args, &cwd, &runtime)
}

pub fn run_with_runtime(
    args: &[std::ffi::OsString],
    cwd: &Path,
    runtime: &ProductionRuntime,
) -> Result<i32, GuideError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(GuideError::Cli(error.to_string())),
        },
    };

    let screenshot_override = match &cli.command {
        Command::Record { screenshot, .. } => screenshot.clone(),
        _ => None,
    };
    let out_dir_override = match &cli.command {
        Command::Export { out_dir, .. } => out_dir.clone(),
        _ => None,
    };
    let overrides = CliOverrides {
        config_path: cli.config.clone(),
        working_dir: cli.working_dir.clone(),
        db_path: cli.db_path.clone(),
        screenshot_path: screenshot_override,
        output_dir: out_dir_override,
        log_path: cli.log_path.clone(),
    };
    let (cfg, scope) = load_config(&overrides, cwd, runtime.file_system.as_ref())?;

    init_run_logger(JsonlLogger {
        path: scope.resolve(&cfg.logging.path),
        max_payload_bytes: cfg.logging.max_payload_bytes,
        budget_bytes: cfg.logging.budget_bytes,
    });

    let ledger = Arc::new(StepLedger::open_with(
        scope.resolve(&cfg.storage.db_path),
        LedgerOptions {
            max_slot_bytes: cfg.storage.max_slot_bytes,
        },
    )?);

    match cli.command {
        Command::Record { events, .. } => record(runtime, &cfg, &scope, ledger, &events),
        Command::List => list(runtime, &ledger),
        Command::Review { keys } => review_guide(runtime, &cfg, &scope, &ledger, &keys),
        Command::EditTitle { step, title } => {
            ledger.update_title(step_index(step)?, title)?;
            runtime.terminal.write_line(&format!("Step {step} renamed"))?;
            Ok(0)
        }
        Command::EditDescription { step, description } => {
            ledger.update_description(step_index(step)?, description)?;
            runtime
                .terminal
                .write_line(&format!("Step {step} description saved"))?;
            Ok(0)
        }
        Command::Delete { step, yes } => {
            let index = step_index(step)?;
            let confirmed = yes
                || runtime
                    .terminal
                    .confirm(&format!("Are you sure you want to delete Step {step}?"))?;
            if !confirmed {
                runtime.terminal.write_line("delete cancelled")?;
                return Ok(0);
            }
            let removed = ledger.delete(index)?;
            runtime
                .terminal
                .write_line(&format!("deleted Step {step}: {}", removed.title))?;
            Ok(0)
        }
        Command::Move { from, to } => {
            ledger.move_step(step_index(from)?, step_index(to)?)?;
            runtime
                .terminal
                .write_line(&format!("moved Step {from} to position {to}"))?;
            Ok(0)
        }
        Command::Clear => {
            ledger.clear()?;
            runtime.terminal.write_line("guide cleared")?;
            Ok(0)
        }
        Command::Export { name, format, .. } => {
            let name = name.unwrap_or_else(|| cfg.export.default_name.clone());
            export_to_disk(runtime, &cfg, &scope, &ledger, &name, format.into())?;
            Ok(0)
        }
    }
}

/// CLI step numbers are 1-based, as shown in the review surface.
fn step_index(step: usize) -> Result<usize, GuideError> {
    step.checked_sub(1)
        .ok_or_else(|| GuideError::Cli("step numbers start at 1".to_string()))
}

fn record(
    runtime: &ProductionRuntime,
    cfg: &AppConfig,
    scope: &RuntimeScope,
    ledger: Arc<StepLedger>,
    events_path: &Path,
) -> Result<i32, GuideError> {
    let raw = runtime
        .file_system
        .read_to_string(&scope.resolve(events_path))?;
    let events = parse_script(&raw)?;

    let screen_capture: Arc<dyn ScreenCapture> = match &cfg.capture.screenshot_path {
        Some(path) => Arc::new(FileScreenCapture::new(Some(scope.resolve(path)))),
        None => runtime.screen_capture.clone(),
    };
    let coordinator = CaptureCoordinator::new(
        ledger,
        screen_capture,
        runtime.clock.clone(),
        CaptureSettings {
            highlight: Duration::from_millis(cfg.capture.highlight_ms),
            overlay_id: cfg.capture.overlay_id.clone(),
        },
    );
    let page = ScriptedPage::new();
    let summary = run_script(&coordinator, &page, runtime.clock.as_ref(), &events)?;

    let message = format!(
        "recorded={} skipped={} ignored={} steps={}",
        summary.appended, summary.skipped, summary.ignored, summary.steps
    );
    if runtime.terminal.stdin_is_tty() {
        runtime
            .terminal
            .write_line(&format!("recording complete: {message}"))?;
    } else {
        runtime
            .terminal
            .write_line(&structured_fallback_line("record", "complete", &message))?;
    }
    if summary.review_requested {
        let steps = coordinator.ledger().list_steps()?;
        let selected = (!steps.is_empty()).then_some(0);
        let frame = render_review_with_cursor(&steps, selected, REVIEW_WIDTH, REVIEW_HEIGHT)?;
        runtime.terminal.draw(&frame)?;
    }
    Ok(0)
}

fn list(runtime: &ProductionRuntime, ledger: &StepLedger) -> Result<i32, GuideError> {
    let steps = ledger.list_steps()?;
    if steps.is_empty() {
        runtime.terminal.write_line(review::EMPTY_GUIDE_MESSAGE)?;
        return Ok(0);
    }
    for (index, step) in steps.iter().enumerate() {
        runtime.terminal.write_line(&format!(
            "Step {}: {} [{}]",
            index + 1,
            step.title,
            review::screenshot_fingerprint(&step.screenshot)
        ))?;
        for line in step.description.lines() {
            runtime.terminal.write_line(&format!("    {line}"))?;
        }
    }
    Ok(0)
}

fn review_guide(
    runtime: &ProductionRuntime,
    cfg: &AppConfig,
    scope: &RuntimeScope,
    ledger: &StepLedger,
    keys: &str,
) -> Result<i32, GuideError> {
    let mut cursor = ReviewCursor::default();
    for key in keys.chars() {
        let Some(action) = handle_key(key) else {
            append_run_log("debug", "review.key.unbound", json!({ "key": key.to_string() }));
            continue;
        };
        match cursor.apply(action, ledger, runtime.terminal.as_ref())? {
            ReviewOutcome::Continue => {}
            ReviewOutcome::Quit => break,
            ReviewOutcome::Export(format) => {
                export_to_disk(
                    runtime,
                    cfg,
                    scope,
                    ledger,
                    &cfg.export.default_name,
                    format,
                )?;
            }
        }
    }

    let steps = ledger.list_steps()?;
    let selected = (!steps.is_empty()).then_some(cursor.selected);
    let frame = render_review_with_cursor(&steps, selected, REVIEW_WIDTH, REVIEW_HEIGHT)?;
    runtime.terminal.draw(&frame)?;
    Ok(0)
}

fn export_to_disk(
    runtime: &ProductionRuntime,
    cfg: &AppConfig,
    scope: &RuntimeScope,
    ledger: &StepLedger,
    name: &str,
    format: ExportFormat,
) -> Result<(), GuideError> {
    let out_dir = scope.resolve(&cfg.export.output_dir);
    let rendered = export_guide(
        ledger,
        runtime.file_system.as_ref(),
        &out_dir,
        name,
        format,
    )?;
    runtime.terminal.write_line(&format!(
        "exported {} ({})",
        out_dir.join(&rendered.filename).display(),
        rendered.mime_type
    ))
}

pub fn render_help() -> String {
    let mut cmd = Cli::command();
    cmd.render_long_help().to_string()
}

use crate::capture::{DEFAULT_HIGHLIGHT_MS, DEFAULT_OVERLAY_ID};
use crate::errors::GuideError;
use crate::export::DEFAULT_GUIDE_NAME;
use crate::ledger::DEFAULT_MAX_SLOT_BYTES;
use crate::logging::{DEFAULT_DISK_BUDGET_BYTES, DEFAULT_MAX_PAYLOAD_BYTES};
use crate::runtime::FileSystem;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "stepwise.toml";

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub screenshot_path: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub log_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub capture: CaptureConfig,
    pub export: ExportConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    pub db_path: PathBuf,
    pub max_slot_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaptureConfig {
    pub highlight_ms: u64,
    pub overlay_id: String,
    pub screenshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportConfig {
    pub default_name: String,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub path: PathBuf,
    pub max_payload_bytes: usize,
    pub budget_bytes: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                db_path: PathBuf::from(".stepwise/guide.sqlite"),
                max_slot_bytes: DEFAULT_MAX_SLOT_BYTES,
            },
            capture: CaptureConfig {
                highlight_ms: DEFAULT_HIGHLIGHT_MS,
                overlay_id: DEFAULT_OVERLAY_ID.to_string(),
                screenshot_path: None,
            },
            export: ExportConfig {
                default_name: DEFAULT_GUIDE_NAME.to_string(),
                output_dir: PathBuf::from("."),
            },
            logging: LoggingConfig {
                path: PathBuf::from(".stepwise/logs/stepwise.jsonl"),
                max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
                budget_bytes: DEFAULT_DISK_BUDGET_BYTES,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialAppConfig {
    storage: Option<PartialStorageConfig>,
    capture: Option<PartialCaptureConfig>,
    export: Option<PartialExportConfig>,
    logging: Option<PartialLoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialStorageConfig {
    db_path: Option<PathBuf>,
    max_slot_bytes: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialCaptureConfig {
    highlight_ms: Option<u64>,
    overlay_id: Option<String>,
    screenshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialExportConfig {
    default_name: Option<String>,
    output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialLoggingConfig {
    path: Option<PathBuf>,
    max_payload_bytes: Option<usize>,
    budget_bytes: Option<u64>,
}

/// Directory every relative path in the config is resolved against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeScope {
    pub process_cwd: PathBuf,
    pub working_dir: PathBuf,
}

impl RuntimeScope {
    pub fn resolve(&self, path: &Path) -> PathBuf {
        absolutize_path(&self.working_dir, path)
    }
}

/// Defaults, then the TOML file (explicit `--config`, else `stepwise.toml` in
/// the working directory when present), then CLI flags.
pub fn load_config(
    overrides: &CliOverrides,
    process_cwd: &Path,
    fs: &dyn FileSystem,
) -> Result<(AppConfig, RuntimeScope), GuideError> {
    let scope = resolve_scope(process_cwd, overrides);
    let mut cfg = AppConfig::default();

    let config_path = match &overrides.config_path {
        Some(path) => Some(absolutize_path(process_cwd, path)),
        None => {
            let candidate = scope.working_dir.join(DEFAULT_CONFIG_FILE);
            fs.exists(&candidate).then_some(candidate)
        }
    };
    if let Some(path) = config_path {
        let file_contents = fs.read_to_string(&path)?;
        let partial: PartialAppConfig = toml::from_str(&file_contents)
            .map_err(|e| GuideError::ConfigParse(e.to_string()))?;
        merge_partial_config(&mut cfg, partial);
    }

    apply_cli_overrides(&mut cfg, overrides);
    validate_config(&cfg)?;
    Ok((cfg, scope))
}

fn merge_partial_config(cfg: &mut AppConfig, partial: PartialAppConfig) {
    if let Some(storage) = partial.storage {
        if let Some(value) = storage.db_path {
            cfg.storage.db_path = value;
        }
        if let Some(value) = storage.max_slot_bytes {
            cfg.storage.max_slot_bytes = value;
        }
    }

    if let Some(capture) = partial.capture {
        if let Some(value) = capture.highlight_ms {
            cfg.capture.highlight_ms = value;
        }
        if let Some(value) = capture.overlay_id {
            cfg.capture.overlay_id = value;
        }
        if let Some(value) = capture.screenshot_path {
            cfg.capture.screenshot_path = Some(value);
        }
    }

    if let Some(export) = partial.export {
        if let Some(value) = export.default_name {
            cfg.export.default_name = value;
        }
        if let Some(value) = export.output_dir {
            cfg.export.output_dir = value;
        }
    }

    if let Some(logging) = partial.logging {
        if let Some(value) = logging.path {
            cfg.logging.path = value;
        }
        if let Some(value) = logging.max_payload_bytes {
            cfg.logging.max_payload_bytes = value;
        }
        if let Some(value) = logging.budget_bytes {
            cfg.logging.budget_bytes = value;
        }
    }
}

fn apply_cli_overrides(cfg: &mut AppConfig, overrides: &CliOverrides) {
    if let Some(path) = &overrides.db_path {
        cfg.storage.db_path = path.clone();
    }
    if let Some(path) = &overrides.screenshot_path {
        cfg.capture.screenshot_path = Some(path.clone());
    }
    if let Some(path) = &overrides.output_dir {
        cfg.export.output_dir = path.clone();
    }
    if let Some(path) = &overrides.log_path {
        cfg.logging.path = path.clone();
    }
}

pub fn resolve_scope(process_cwd: &Path, overrides: &CliOverrides) -> RuntimeScope {
    let process_cwd = process_cwd.to_path_buf();
    let working_dir = match &overrides.working_dir {
        Some(path) => absolutize_path(&process_cwd, path),
        None => process_cwd.clone(),
    };
    RuntimeScope {
        process_cwd,
        working_dir,
    }
}

fn absolutize_path(base: &Path, value: &Path) -> PathBuf {
    if value.is_absolute() {
        value.to_path_buf()
    } else {
        base.join(value)
    }
}

fn validate_config(cfg: &AppConfig) -> Result<(), GuideError> {
    if cfg.capture.highlight_ms == 0 {
        return Err(GuideError::InvalidConfig(
            "capture.highlight_ms must be greater than zero".to_string(),
        ));
    }

    if cfg.capture.overlay_id.trim().is_empty() {
        return Err(GuideError::InvalidConfig(
            "capture.overlay_id must not be empty".to_string(),
        ));
    }

    if cfg.storage.max_slot_bytes == 0 {
        return Err(GuideError::InvalidConfig(
            "storage.max_slot_bytes must be greater than zero".to_string(),
        ));
    }

    if cfg.storage.db_path.as_os_str().is_empty() {
        return Err(GuideError::InvalidConfig(
            "storage.db_path must not be empty".to_string(),
        ));
    }

    Ok(())
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GuideError {
    #[error("io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("cli error: {0}")]
    Cli(String),
    #[error("capture error: {0}")]
    Capture(String),
    #[error("step index {index} is out of range for a guide of {len} steps")]
    OutOfRange { index: usize, len: usize },
    #[error("database error: {0}")]
    Database(String),
    #[error("store quota exceeded: slot needs {needed} bytes, limit is {limit}")]
    StoreQuota { needed: usize, limit: usize },
    #[error("illegal recorder transition: {0}")]
    InvalidTransition(String),
}

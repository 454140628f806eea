use sonde_types::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InferError {
    #[error("could not allocate {what} for {count} entries")]
    Alloc { what: &'static str, count: usize },
    #[error("shadow stack depth must be at least 1")]
    ZeroDepth,
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode report: {0}")]
    Json(#[from] serde_json::Error),
}

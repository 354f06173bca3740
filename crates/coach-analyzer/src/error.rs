//! Analyzer error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("Configuration error: {0}")]
    Config(&'static str),

    #[error("Engine executable not found at {0}")]
    EngineMissing(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

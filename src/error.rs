use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("This tool must be run as root")]
    NotRoot,

    #[error("Failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command failed ({}): {command}{}", exit_label(.code), detail_suffix(.detail))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        detail: String,
    },

    #[error("Command timed out after {secs}s: {command}")]
    CommandTimeout { command: String, secs: u64 },

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Config file not found: {}", .0.display())]
    ConfigMissing(PathBuf),

    #[error("Invalid server config: {0}")]
    InvalidConfig(String),

    #[error("Service {0} failed")]
    ServiceAction(&'static str),

    #[error("Input closed")]
    InputClosed,

    #[error("Interrupted")]
    Interrupted,
}

impl AppError {
    /// Interactive cancellation, not a failure.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, AppError::InputClosed | AppError::Interrupted)
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit {}", code),
        None => "killed".to_string(),
    }
}

fn detail_suffix(detail: &str) -> String {
    if detail.is_empty() {
        String::new()
    } else {
        format!("\n{}", detail)
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

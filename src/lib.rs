//! codesnip-bridge - drive `cargo codesnip` without an editor.
//!
//! This library provides the core functionality for the `csb` CLI tool:
//! resolving snippet settings, keeping the snippet cache alive, building
//! the external tool invocations, and applying bundled snippets to documents.

pub mod cli;
pub mod commands;
pub mod config;
pub mod document;
pub mod guard;
pub mod messages;
pub mod orchestrator;
pub mod tool;

use std::path::PathBuf;

use serde::Serialize;

use crate::tool::Version;


/// Follow-up action a presentation layer can offer alongside an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Remedy {
    /// Point the user at the settings file
    OpenSettings,
    /// Offer to build the snippet cache
    UpdateCache,
    /// Re-run after the environment was fixed
    Reload,
    /// Show the captured tool output
    ShowOutput,
}

impl std::fmt::Display for Remedy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Remedy::OpenSettings => write!(f, "open-settings"),
            Remedy::UpdateCache => write!(f, "update-cache"),
            Remedy::Reload => write!(f, "reload"),
            Remedy::ShowOutput => write!(f, "show-output"),
        }
    }
}

/// Library-level error type for codesnip-bridge operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse settings in {}: {message}", display_path(.path))]
    Settings { path: PathBuf, message: String },

    #[error("`{tool}` not found")]
    ToolNotFound { tool: String, hint: Option<String> },

    #[error("cargo-codesnip {found} is older than the required {required}")]
    ToolVersionTooOld { found: Version, required: Version },

    #[error("No cache file is set")]
    NoCacheFileConfigured,

    #[error("No source file is set")]
    MissingSourceConfiguration,

    #[error("`{command}` failed: {}", summarize_stderr(.stderr, .code))]
    ToolInvocationFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Cache not found: {}", display_path(.path))]
    CacheMissing { path: PathBuf },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Other(String),
}

fn display_path(path: &std::path::Path) -> String {
    path.display().to_string()
}

fn summarize_stderr(stderr: &str, code: &Option<i32>) -> String {
    let stderr = stderr.trim();
    match (stderr.is_empty(), code) {
        (false, _) => stderr.to_string(),
        (true, Some(code)) => format!("exit status {}", code),
        (true, None) => "terminated by signal".to_string(),
    }
}

impl Error {
    /// The follow-up action worth offering for this error, if any.
    pub fn remedy(&self) -> Option<Remedy> {
        match self {
            Error::Settings { .. } | Error::NoCacheFileConfigured => Some(Remedy::OpenSettings),
            Error::MissingSourceConfiguration => Some(Remedy::OpenSettings),
            Error::ToolNotFound { .. } | Error::ToolVersionTooOld { .. } => Some(Remedy::Reload),
            Error::ToolInvocationFailed { .. } => Some(Remedy::ShowOutput),
            Error::CacheMissing { .. } => Some(Remedy::UpdateCache),
            _ => None,
        }
    }
}

/// Result type alias for codesnip-bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

//! User-facing error and warning messages.
//!
//! Human output follows one layout:
//! ```text
//! csb: error: <category>: <brief>
//!
//!   <details>
//!
//!   <suggestion>
//! ```

use std::fmt::Write;

use serde::Serialize;

use crate::{Error, Remedy};

/// Area an error or warning belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Settings files and resolved configuration
    Settings,
    /// Prerequisite checks for the external tool
    Tool,
    /// Snippet cache lifecycle
    Cache,
    /// A failed `cargo codesnip` run
    Run,
    /// Anything else
    General,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Settings => write!(f, "settings"),
            Self::Tool => write!(f, "tool"),
            Self::Cache => write!(f, "cache"),
            Self::Run => write!(f, "run"),
            Self::General => write!(f, "general"),
        }
    }
}

fn push_indented(msg: &mut String, block: &str) {
    msg.push_str("\n\n");
    for line in block.lines() {
        let _ = writeln!(msg, "  {}", line);
    }
    if msg.ends_with('\n') {
        msg.pop();
    }
}

/// Format an error message.
pub fn format_error(
    category: Category,
    brief: &str,
    details: Option<&str>,
    suggestion: Option<&str>,
) -> String {
    let mut msg = format!("csb: error: {}: {}", category, brief);
    if let Some(details) = details.filter(|d| !d.trim().is_empty()) {
        push_indented(&mut msg, details);
    }
    if let Some(suggestion) = suggestion {
        push_indented(&mut msg, suggestion);
    }
    msg
}

/// Format a warning message.
pub fn format_warning(category: Category, brief: &str, details: Option<&str>) -> String {
    let mut msg = format!("csb: warning: {}: {}", category, brief);
    if let Some(details) = details.filter(|d| !d.trim().is_empty()) {
        push_indented(&mut msg, details);
    }
    msg
}

/// Machine-readable error, written to stderr in JSON mode.
#[derive(Debug, Serialize)]
pub struct ErrorReport {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remedy: Option<Remedy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorReport {
    pub fn from_error(err: &Error) -> Self {
        Self {
            error: err.to_string(),
            remedy: err.remedy(),
            hint: suggestion(err),
        }
    }
}

fn category(err: &Error) -> Category {
    match err {
        Error::Settings { .. }
        | Error::NoCacheFileConfigured
        | Error::MissingSourceConfiguration => Category::Settings,
        Error::ToolNotFound { .. } | Error::ToolVersionTooOld { .. } => Category::Tool,
        Error::CacheMissing { .. } => Category::Cache,
        Error::ToolInvocationFailed { .. } => Category::Run,
        _ => Category::General,
    }
}

fn suggestion(err: &Error) -> Option<String> {
    let text = match err {
        Error::ToolNotFound { hint: Some(hint), .. } => return Some(hint.clone()),
        Error::ToolVersionTooOld { required, .. } => {
            return Some(format!(
                "Run `cargo install codesnip --force` to get {} or newer.",
                required
            ));
        }
        Error::CacheMissing { .. } => "Run `csb update` to create it.",
        Error::NoCacheFileConfigured => {
            "Set `cache-file` in codesnip.kdl, or pass --cache-file or -C <project>."
        }
        Error::MissingSourceConfiguration => {
            "Add `source \"src/lib.rs\"` to codesnip.kdl, or run `csb config init --source <FILE>`."
        }
        Error::Settings { .. } => "Fix the settings file and run the command again.",
        _ => return None,
    };
    Some(text.to_string())
}

/// Render an error as a human notification.
///
/// A failed tool run keeps its first line as the brief and shows the full
/// captured stderr as details.
pub fn notify_error(err: &Error) -> String {
    let suggestion = suggestion(err);
    match err {
        Error::ToolInvocationFailed {
            command, stderr, ..
        } => {
            let full = err.to_string();
            format_error(
                Category::Run,
                full.lines().next().unwrap_or_default(),
                Some(&format!("$ {}\n{}", command, stderr.trim_end())),
                suggestion.as_deref(),
            )
        }
        _ => format_error(category(err), &err.to_string(), None, suggestion.as_deref()),
    }
}

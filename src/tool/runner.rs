//! Running external tool invocations.
//!
//! [`ToolRunner`] is the seam between the orchestrator and the operating
//! system. [`ProcessRunner`] spawns a child process directly (no shell) and
//! waits for it to exit; tests substitute a scripted runner.

use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;

use serde::Serialize;

use crate::tool::Invocation;
use crate::{Error, Result};

/// Captured result of a finished invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolOutput {
    /// Exit code, `None` when the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// A successful run that printed `stdout`.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed run with the given exit code and stderr.
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turn a non-zero exit into [`Error::ToolInvocationFailed`].
    pub fn check(self, invocation: &Invocation) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::ToolInvocationFailed {
                command: invocation.build(),
                code: self.code,
                stderr: self.stderr,
            })
        }
    }
}

/// Executes invocations and reports their output.
///
/// Implementations must not interpret the exit code: a non-zero exit is a
/// normal `Ok(ToolOutput)`. `Err` is reserved for failing to run at all.
pub trait ToolRunner {
    fn run(&self, invocation: &Invocation) -> impl Future<Output = Result<ToolOutput>> + Send;
}

/// Runs invocations as child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    /// Working directory for spawned processes (inherits ours when unset)
    current_dir: Option<PathBuf>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every invocation from `dir`, typically the project root so that
    /// relative source targets resolve.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            current_dir: Some(dir.into()),
        }
    }
}

impl ToolRunner for ProcessRunner {
    fn run(&self, invocation: &Invocation) -> impl Future<Output = Result<ToolOutput>> + Send {
        let mut command = tokio::process::Command::new(invocation.program());
        command
            .args(invocation.argv())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(ref dir) = self.current_dir {
            command.current_dir(dir);
        }
        let rendered = invocation.build();

        async move {
            tracing::debug!(command = %rendered, "running external tool");
            let output = command
                .output()
                .await
                .map_err(|e| Error::ToolInvocationFailed {
                    command: rendered.clone(),
                    code: None,
                    stderr: format!("Failed to run {}: {}", rendered, e),
                })?;

            let result = ToolOutput {
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            };
            tracing::debug!(command = %rendered, code = ?result.code, "external tool finished");
            Ok(result)
        }
    }
}

//! Detecting the external tools before anything else runs.

use serde::Serialize;

use crate::config::ToolSpec;
use crate::tool::{Invocation, ToolRunner, Version};
use crate::{Error, Result};

/// What the prerequisite check found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolInfo {
    /// First line of `<program> --version`
    pub program_banner: String,
    /// First line of `<tool> --version`
    pub tool_banner: String,
    /// Parsed tool version, when the banner carried one
    pub version: Option<Version>,
}

/// Check that both the program (`cargo`) and the tool (`cargo codesnip`)
/// run, and that the tool meets `min_version`.
pub async fn check_prerequisites<R: ToolRunner>(
    runner: &R,
    tool: &ToolSpec,
    min_version: Option<Version>,
) -> Result<ToolInfo> {
    let program_banner = probe(runner, &Invocation::program_version(tool))
        .await
        .ok_or_else(|| Error::ToolNotFound {
            tool: tool.program.clone(),
            hint: None,
        })?;

    let tool_banner = probe(runner, &Invocation::tool_version(tool))
        .await
        .ok_or_else(|| Error::ToolNotFound {
            tool: tool.display_name(),
            hint: Some("Run `cargo install codesnip`.".to_string()),
        })?;

    let version = Version::from_banner(&tool_banner);
    match (version, min_version) {
        (Some(found), Some(required)) if found < required => {
            return Err(Error::ToolVersionTooOld { found, required });
        }
        (None, Some(required)) => {
            tracing::warn!(
                banner = %tool_banner,
                %required,
                "could not read the tool version, skipping the minimum version check"
            );
        }
        _ => {}
    }

    Ok(ToolInfo {
        program_banner,
        tool_banner,
        version,
    })
}

/// Run a `--version` probe; `None` when it cannot run or exits non-zero.
async fn probe<R: ToolRunner>(runner: &R, invocation: &Invocation) -> Option<String> {
    match runner.run(invocation).await {
        Ok(output) if output.is_success() => {
            Some(output.stdout.lines().next().unwrap_or("").trim().to_string())
        }
        Ok(output) => {
            tracing::debug!(command = %invocation.build(), code = ?output.code, "version probe failed");
            None
        }
        Err(e) => {
            tracing::debug!(command = %invocation.build(), error = %e, "version probe failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedRunner;
    use crate::tool::ToolOutput;

    #[tokio::test]
    async fn test_both_tools_present() {
        let runner = ScriptedRunner::new()
            .push(Ok(ToolOutput::success("cargo 1.85.0 (d73d2caf9 2024-12-31)\n")))
            .push(Ok(ToolOutput::success("cargo-codesnip 0.4.1\n")));

        let info = check_prerequisites(&runner, &ToolSpec::default(), None)
            .await
            .unwrap();

        assert_eq!(info.tool_banner, "cargo-codesnip 0.4.1");
        assert_eq!(info.version, Some(Version::new(0, 4, 1)));
        assert_eq!(
            runner.calls(),
            vec!["cargo --version", "cargo codesnip --version"]
        );
    }

    #[tokio::test]
    async fn test_missing_cargo_stops_early() {
        let runner = ScriptedRunner::new().push(Err(Error::ToolInvocationFailed {
            command: "cargo --version".to_string(),
            code: None,
            stderr: "No such file or directory".to_string(),
        }));

        let err = check_prerequisites(&runner, &ToolSpec::default(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ToolNotFound { ref tool, hint: None } if tool == "cargo"));
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_codesnip_has_install_hint() {
        let runner = ScriptedRunner::new()
            .push(Ok(ToolOutput::success("cargo 1.85.0\n")))
            .push(Ok(ToolOutput::failure(101, "error: no such command: `codesnip`")));

        let err = check_prerequisites(&runner, &ToolSpec::default(), None)
            .await
            .unwrap_err();

        match err {
            Error::ToolNotFound { tool, hint } => {
                assert_eq!(tool, "cargo codesnip");
                assert!(hint.unwrap().contains("cargo install codesnip"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_version_gate() {
        let runner = ScriptedRunner::new()
            .push(Ok(ToolOutput::success("cargo 1.85.0\n")))
            .push(Ok(ToolOutput::success("cargo-codesnip 0.3.9\n")));

        let err = check_prerequisites(
            &runner,
            &ToolSpec::default(),
            Some(Version::new(0, 4, 0)),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            Error::ToolVersionTooOld { found, required }
                if found == Version::new(0, 3, 9) && required == Version::new(0, 4, 0)
        ));
    }

    #[tokio::test]
    async fn test_unreadable_version_skips_gate() {
        let runner = ScriptedRunner::new()
            .push(Ok(ToolOutput::success("cargo 1.85.0\n")))
            .push(Ok(ToolOutput::success("cargo-codesnip dev\n")));

        let info = check_prerequisites(
            &runner,
            &ToolSpec::default(),
            Some(Version::new(0, 4, 0)),
        )
        .await
        .unwrap();

        assert_eq!(info.version, None);
    }
}

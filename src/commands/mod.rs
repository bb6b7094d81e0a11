//! Command implementations for the csb CLI.
//!
//! Each command returns a result type implementing [`Output`], rendered as
//! JSON by default or as human-readable text with `-H`. Commands that drive
//! the external tool take an activated [`CacheOrchestrator`]; see
//! [`activate`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{
    ConfigOverrides, Configuration, InsertionPosition, ResolvedConfig, SettingsChange,
    SnipSettings, ValueSource, watch_settings, write_project_settings,
};
use crate::document::{Selection, insert_bundle};
use crate::messages::{self, ErrorReport};
use crate::orchestrator::{
    CacheOrchestrator, CacheState, EnsureOutcome, UpdateOutcome, VerifyReport,
};
use crate::tool::{ToolInfo, ToolRunner, check_prerequisites};
use crate::{Error, Result};

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

fn json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string())
}

/// Build information baked in by build.rs.
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub built: &'static str,
    pub commit: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            built: env!("CSB_BUILD_TIMESTAMP"),
            commit: env!("CSB_GIT_COMMIT"),
        }
    }
}

/// Check prerequisites and hand back an orchestrator ready for work.
///
/// Runs `cargo --version` and `cargo codesnip --version` (and the minimum
/// version gate). A configuration without source targets is allowed, with a
/// warning, since list/bundle/verify only need the cache.
pub async fn activate<R: ToolRunner>(
    runner: R,
    config: Configuration,
) -> Result<CacheOrchestrator<R>> {
    let info = check_prerequisites(&runner, &config.tool, config.min_tool_version).await?;
    tracing::debug!(tool = %info.tool_banner, "prerequisites satisfied");

    if config.source.is_empty() {
        tracing::warn!("No source file is set");
    }
    Ok(CacheOrchestrator::new(Arc::new(config), runner))
}

// ==================== doctor ====================

#[derive(Debug, Serialize)]
pub struct DoctorResult {
    pub ok: bool,
    pub build: BuildInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<ToolInfo>,
    pub cache_file: PathBuf,
    pub cache_file_source: ValueSource,
    pub cache: CacheState,
    pub settings_files: Vec<PathBuf>,
    pub problems: Vec<String>,
}

impl Output for DoctorResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "csb {} (commit {}, built {})",
            self.build.version, self.build.commit, self.build.built
        )];
        match &self.tool {
            Some(tool) => {
                lines.push(format!("  cargo:    {}", tool.program_banner));
                lines.push(format!("  codesnip: {}", tool.tool_banner));
            }
            None => lines.push("  codesnip: unavailable".to_string()),
        }
        lines.push(format!(
            "  cache:    {} ({}, from {})",
            self.cache_file.display(),
            self.cache,
            self.cache_file_source
        ));
        if self.settings_files.is_empty() {
            lines.push("  settings: none".to_string());
        }
        for file in &self.settings_files {
            lines.push(format!("  settings: {}", file.display()));
        }
        if self.problems.is_empty() {
            lines.push(String::new());
            lines.push("No problems found.".to_string());
        } else {
            lines.push(String::new());
            lines.push(format!("{} problem(s):", self.problems.len()));
            for problem in &self.problems {
                lines.push(format!("  - {}", problem));
            }
        }
        lines.join("\n")
    }
}

/// Report on prerequisites and configuration without failing fast.
pub async fn doctor<R: ToolRunner>(runner: &R, resolved: ResolvedConfig) -> DoctorResult {
    let config = resolved.config;
    let mut problems = Vec::new();

    let tool = match check_prerequisites(runner, &config.tool, config.min_tool_version).await {
        Ok(info) => Some(info),
        Err(e) => {
            problems.push(e.to_string());
            None
        }
    };
    if config.source.is_empty() {
        problems.push(Error::MissingSourceConfiguration.to_string());
    }

    let cache = if config.cache_file.is_file() {
        CacheState::Present
    } else {
        CacheState::Missing
    };

    DoctorResult {
        ok: problems.is_empty(),
        build: BuildInfo::current(),
        tool,
        cache_file: config.cache_file,
        cache_file_source: resolved.cache_file_source,
        cache,
        settings_files: resolved.settings_files,
        problems,
    }
}

// ==================== config ====================

#[derive(Debug, Serialize)]
pub struct ConfigShowResult {
    #[serde(flatten)]
    pub resolved: ResolvedConfig,
}

impl Output for ConfigShowResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let config = &self.resolved.config;
        let list = |values: &[String]| {
            if values.is_empty() {
                "(none)".to_string()
            } else {
                values.join(", ")
            }
        };
        let optional = |value: &Option<String>| value.clone().unwrap_or_else(|| "(default)".to_string());

        let mut lines = vec![
            format!(
                "cache-file: {} (from {})",
                config.cache_file.display(),
                self.resolved.cache_file_source
            ),
            format!("source: {}", list(&config.source)),
            format!("cfg: {}", list(&config.cfg)),
            format!("filter-item: {}", list(&config.filter_item)),
            format!("filter-attr: {}", list(&config.filter_attr)),
            format!("minify: {}", config.minify),
            format!("not-hide: {}", config.not_hide),
            format!("insertion-position: {}", config.insertion_position),
            format!("toolchain: {}", optional(&config.toolchain)),
            format!("edition: {}", optional(&config.edition)),
            format!("verbose: {}", config.verbose),
            format!(
                "auto-update-on-missing-cache: {}",
                config.auto_update_on_missing_cache
            ),
            format!("auto-verify-after-update: {}", config.auto_verify_after_update),
            format!("tool: {}", config.tool.display_name()),
        ];
        if let Some(ref version) = config.min_tool_version {
            lines.push(format!("min-tool-version: {}", version));
        }
        for file in &self.resolved.settings_files {
            lines.push(format!("# read {}", file.display()));
        }
        lines.join("\n")
    }
}

pub fn config_show(resolved: ResolvedConfig) -> ConfigShowResult {
    ConfigShowResult { resolved }
}

#[derive(Debug, Serialize)]
pub struct ConfigInitResult {
    pub path: PathBuf,
    pub source: Vec<String>,
}

impl Output for ConfigInitResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.source.is_empty() {
            format!(
                "Wrote {}\nAdd a `source` target before running `csb update`.",
                self.path.display()
            )
        } else {
            format!(
                "Wrote {} with {} source target(s).",
                self.path.display(),
                self.source.len()
            )
        }
    }
}

/// Write a starter `codesnip.kdl` in `project_root`.
pub fn config_init(project_root: &Path, source: Vec<String>, force: bool) -> Result<ConfigInitResult> {
    let settings = SnipSettings {
        source: (!source.is_empty()).then(|| source.clone()),
        insertion_position: Some(InsertionPosition::End.as_str().to_string()),
        auto_update_on_missing_cache: Some(false),
        ..SnipSettings::default()
    };
    let path = write_project_settings(project_root, &settings, force)?;
    tracing::info!(path = %path.display(), "wrote project settings");
    Ok(ConfigInitResult { path, source })
}

// ==================== status ====================

#[derive(Debug, Serialize)]
pub struct StatusResult {
    pub cache_file: PathBuf,
    pub cache_file_source: ValueSource,
    pub state: CacheState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

impl Output for StatusResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        match self.state {
            CacheState::Present => {
                let mut line = format!("Cache present: {}", self.cache_file.display());
                if let Some(size) = self.size_bytes {
                    line.push_str(&format!("\n  size:     {} bytes", size));
                }
                if let Some(modified) = self.modified {
                    line.push_str(&format!(
                        "\n  modified: {}",
                        modified.format("%Y-%m-%d %H:%M:%S UTC")
                    ));
                }
                line
            }
            _ => format!(
                "Cache missing: {} (from {})\nRun `csb update` to create it.",
                self.cache_file.display(),
                self.cache_file_source
            ),
        }
    }
}

/// Report the cache file state without running anything.
pub fn status(resolved: &ResolvedConfig) -> StatusResult {
    let cache_file = resolved.config.cache_file.clone();
    let metadata = std::fs::metadata(&cache_file).ok().filter(|m| m.is_file());

    StatusResult {
        state: if metadata.is_some() {
            CacheState::Present
        } else {
            CacheState::Missing
        },
        size_bytes: metadata.as_ref().map(|m| m.len()),
        modified: metadata
            .and_then(|m| m.modified().ok())
            .map(DateTime::<Utc>::from),
        cache_file,
        cache_file_source: resolved.cache_file_source,
    }
}

// ==================== ensure / update / verify ====================

#[derive(Debug, Serialize)]
pub struct EnsureResult {
    pub cache_file: PathBuf,
    pub cache: EnsureOutcome,
}

impl Output for EnsureResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        match &self.cache {
            EnsureOutcome::Present => format!("Cache present: {}", self.cache_file.display()),
            EnsureOutcome::Updated(update) => format!(
                "Cache created: {}\n{}",
                self.cache_file.display(),
                update_summary(update)
            ),
            EnsureOutcome::Missing => format!(
                "Cache not found: {}\nRun `csb update` (or `csb ensure --force`) to create it.",
                self.cache_file.display()
            ),
        }
    }
}

pub async fn ensure<R: ToolRunner>(
    orchestrator: &mut CacheOrchestrator<R>,
    force: bool,
) -> Result<EnsureResult> {
    let outcome = orchestrator.ensure_cache(force).await?;
    Ok(EnsureResult {
        cache_file: orchestrator.config().cache_file.clone(),
        cache: outcome,
    })
}

#[derive(Debug, Serialize)]
pub struct UpdateResult {
    pub cache_file: PathBuf,
    #[serde(flatten)]
    pub outcome: UpdateOutcome,
}

impl UpdateResult {
    /// False when a chained verify reported failure.
    pub fn is_success(&self) -> bool {
        self.outcome.verify.as_ref().is_none_or(|v| v.success)
    }
}

impl Output for UpdateResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Cache updated: {}\n{}",
            self.cache_file.display(),
            update_summary(&self.outcome)
        )
    }
}

fn update_summary(update: &UpdateOutcome) -> String {
    let mut text = format!("$ {}", update.command);
    if let Some(ref verify) = update.verify {
        text.push('\n');
        text.push_str(&verify_summary(verify));
    }
    text
}

pub async fn update<R: ToolRunner>(orchestrator: &mut CacheOrchestrator<R>) -> Result<UpdateResult> {
    let outcome = orchestrator.update_cache().await?;
    Ok(UpdateResult {
        cache_file: orchestrator.config().cache_file.clone(),
        outcome,
    })
}

#[derive(Debug, Serialize)]
pub struct VerifyResult {
    #[serde(flatten)]
    pub report: VerifyReport,
}

impl Output for VerifyResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        verify_summary(&self.report)
    }
}

fn verify_summary(report: &VerifyReport) -> String {
    let mut text = if report.success {
        "Snippets verified.".to_string()
    } else {
        messages::format_error(
            messages::Category::Run,
            "snippet verification failed",
            Some(report.output.stderr.trim_end()),
            None,
        )
    };
    let stdout = report.output.stdout.trim_end();
    if !stdout.is_empty() {
        text.push_str("\n\n");
        text.push_str(stdout);
    }
    text
}

pub async fn verify<R: ToolRunner>(orchestrator: &mut CacheOrchestrator<R>) -> Result<VerifyResult> {
    let report = orchestrator.verify().await?;
    Ok(VerifyResult { report })
}

// ==================== list ====================

#[derive(Debug, Serialize)]
pub struct ListResult {
    pub count: usize,
    pub names: Vec<String>,
}

impl Output for ListResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.names.is_empty() {
            "No snippets in the cache.".to_string()
        } else {
            self.names.join("\n")
        }
    }
}

pub async fn list<R: ToolRunner>(orchestrator: &mut CacheOrchestrator<R>) -> Result<ListResult> {
    let names = orchestrator.list().await?;
    Ok(ListResult {
        count: names.len(),
        names,
    })
}

// ==================== bundle ====================

#[derive(Debug, Serialize)]
pub struct BundleResult {
    pub name: String,
    pub guards: Vec<String>,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<InsertionPosition>,
    pub written: bool,
    /// The updated document when it was not written back
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
}

impl Output for BundleResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        match (&self.file, &self.document) {
            (Some(file), _) if self.written => format!(
                "Inserted {} into {} ({} guard(s) excluded)",
                self.name,
                file.display(),
                self.guards.len()
            ),
            (_, Some(document)) => document.trim_end_matches('\n').to_string(),
            _ => self.text.trim_end_matches('\n').to_string(),
        }
    }
}

/// Where and how to apply a bundled snippet.
#[derive(Debug, Clone, Default)]
pub struct BundleTarget {
    /// Document scanned for guards and receiving the snippet
    pub file: Option<PathBuf>,
    pub selection: Option<Selection>,
    /// Write the updated document back to `file`
    pub write: bool,
}

/// Bundle `name` and, when a target file is given, insert it there.
pub async fn bundle<R: ToolRunner>(
    orchestrator: &mut CacheOrchestrator<R>,
    name: &str,
    target: BundleTarget,
) -> Result<BundleResult> {
    if target.write && target.file.is_none() {
        return Err(Error::InvalidInput("--write needs --file".to_string()));
    }

    let document = target
        .file
        .as_deref()
        .map(std::fs::read_to_string)
        .transpose()?;
    let bundled = orchestrator.bundle(name, document.as_deref()).await?;

    let Some(document) = document else {
        return Ok(BundleResult {
            name: bundled.name,
            guards: bundled.guards,
            text: bundled.text,
            file: None,
            position: None,
            written: false,
            document: None,
        });
    };

    let mut position = orchestrator.config().insertion_position;
    if position == InsertionPosition::AtCursor && target.selection.is_none() {
        tracing::warn!("insertion-position is cursor but no --selection was given, appending");
        position = InsertionPosition::End;
    }
    let updated = insert_bundle(&document, &bundled.text, position, target.selection)?;

    let written = match target.file {
        Some(ref file) if target.write => {
            std::fs::write(file, &updated)?;
            tracing::info!(file = %file.display(), name, "inserted snippet");
            true
        }
        _ => false,
    };

    Ok(BundleResult {
        name: bundled.name,
        guards: bundled.guards,
        text: bundled.text,
        file: target.file,
        position: Some(position),
        written,
        document: (!written).then_some(updated),
    })
}

// ==================== watch ====================

/// Something that happened while watching settings.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum WatchEvent {
    Started {
        watched: Vec<PathBuf>,
        cache_file: PathBuf,
        cache: EnsureOutcome,
    },
    Reloaded {
        cache_file: PathBuf,
        cache: EnsureOutcome,
    },
    Failed(ErrorReport),
}

impl Output for WatchEvent {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let cache_line = |path: &Path, cache: &EnsureOutcome| match cache {
            EnsureOutcome::Present => format!("cache present: {}", path.display()),
            EnsureOutcome::Updated(_) => format!("cache created: {}", path.display()),
            EnsureOutcome::Missing => format!(
                "cache not found: {} (run `csb update`)",
                path.display()
            ),
        };
        match self {
            WatchEvent::Started {
                watched,
                cache_file,
                cache,
            } => {
                let mut lines = vec![format!("Watching {} settings file(s)", watched.len())];
                lines.extend(watched.iter().map(|p| format!("  {}", p.display())));
                lines.push(cache_line(cache_file, cache));
                lines.join("\n")
            }
            WatchEvent::Reloaded { cache_file, cache } => {
                format!("Settings reloaded; {}", cache_line(cache_file, cache))
            }
            WatchEvent::Failed(report) => messages::format_warning(
                messages::Category::Settings,
                &report.error,
                report.hint.as_deref(),
            ),
        }
    }
}

/// Apply a settings change: swap the snapshot in, re-check prerequisites,
/// and make sure the cache exists.
///
/// A failed resolution leaves the previous snapshot in place.
pub async fn apply_settings_change<R: ToolRunner>(
    orchestrator: &mut CacheOrchestrator<R>,
    change: SettingsChange,
) -> WatchEvent {
    let resolved = match change {
        SettingsChange::Resolved(resolved) => resolved,
        SettingsChange::Failed(e) => return WatchEvent::Failed(ErrorReport::from_error(&e)),
    };

    let config = resolved.config;
    if let Err(e) =
        check_prerequisites(orchestrator.runner(), &config.tool, config.min_tool_version).await
    {
        return WatchEvent::Failed(ErrorReport::from_error(&e));
    }
    if config.source.is_empty() {
        tracing::warn!("No source file is set");
    }

    orchestrator.replace_config(Arc::new(config));
    match orchestrator.ensure_cache(false).await {
        Ok(cache) => WatchEvent::Reloaded {
            cache_file: orchestrator.config().cache_file.clone(),
            cache,
        },
        Err(e) => WatchEvent::Failed(ErrorReport::from_error(&e)),
    }
}

/// Follow settings changes until Ctrl-C, passing every event to `emit`.
pub async fn watch<R, F>(
    mut orchestrator: CacheOrchestrator<R>,
    project_root: Option<PathBuf>,
    overrides: ConfigOverrides,
    mut emit: F,
) -> Result<()>
where
    R: ToolRunner,
    F: FnMut(&WatchEvent),
{
    let (watcher, mut changes) = watch_settings(project_root, overrides)?;

    let cache = orchestrator.ensure_cache(false).await?;
    emit(&WatchEvent::Started {
        watched: watcher.watched_files().to_vec(),
        cache_file: orchestrator.config().cache_file.clone(),
        cache,
    });

    loop {
        tokio::select! {
            change = changes.recv() => {
                let Some(change) = change else { break };
                let event = apply_settings_change(&mut orchestrator, change).await;
                emit(&event);
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::debug!("interrupted, stopping settings watcher");
                break;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ScriptedRunner, TestEnv};
    use crate::tool::ToolOutput;

    fn strings(values: &[&str]) -> Option<Vec<String>> {
        Some(values.iter().map(|s| s.to_string()).collect())
    }

    fn resolve(env: &TestEnv, settings: SnipSettings) -> Configuration {
        Configuration::resolve(&settings, Some(env.path())).unwrap()
    }

    fn resolved(env: &TestEnv, settings: SnipSettings) -> ResolvedConfig {
        ResolvedConfig {
            config: resolve(env, settings),
            cache_file_source: ValueSource::Default,
            settings_files: Vec::new(),
        }
    }

    /// Answers version probes like an installed cargo-codesnip 0.4.1.
    fn installed_tool() -> ScriptedRunner {
        ScriptedRunner::with_handler(|invocation| {
            let argv = invocation.argv();
            if argv.last().map(String::as_str) == Some("--version") {
                let banner = if argv.len() == 1 {
                    "cargo 1.85.0 (d73d2caf9 2024-12-31)\n"
                } else {
                    "cargo-codesnip 0.4.1\n"
                };
                return Ok(ToolOutput::success(banner));
            }
            Ok(ToolOutput::success(""))
        })
    }

    #[tokio::test]
    async fn test_activate_checks_prerequisites() {
        let env = TestEnv::new();
        let orchestrator = activate(installed_tool(), resolve(&env, SnipSettings::new()))
            .await
            .unwrap();

        assert_eq!(
            orchestrator.runner().calls(),
            vec!["cargo --version", "cargo codesnip --version"]
        );
        assert_eq!(orchestrator.state(), CacheState::Unknown);
    }

    #[tokio::test]
    async fn test_activate_without_tool_fails() {
        let env = TestEnv::new();
        let runner = ScriptedRunner::new()
            .push(Ok(ToolOutput::success("cargo 1.85.0\n")))
            .push(Ok(ToolOutput::failure(101, "error: no such command: `codesnip`")));

        let err = activate(runner, resolve(&env, SnipSettings::new()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::ToolNotFound { .. }));
    }

    #[tokio::test]
    async fn test_doctor_collects_problems() {
        let env = TestEnv::new();
        let runner = ScriptedRunner::new().push(Ok(ToolOutput::failure(127, "")));

        let result = doctor(&runner, resolved(&env, SnipSettings::new())).await;
        assert!(!result.ok);
        assert!(result.tool.is_none());
        assert_eq!(result.problems.len(), 2);
        assert_eq!(result.problems[1], "No source file is set");
        assert_eq!(result.cache, CacheState::Missing);
    }

    #[tokio::test]
    async fn test_doctor_healthy() {
        let env = TestEnv::new();
        env.touch_cache();
        let settings = SnipSettings {
            source: strings(&["src/lib.rs"]),
            ..Default::default()
        };

        let result = doctor(&installed_tool(), resolved(&env, settings)).await;
        assert!(result.ok, "problems: {:?}", result.problems);
        assert_eq!(result.cache, CacheState::Present);
        assert!(result.to_human().contains("No problems found."));
    }

    #[test]
    fn test_status_reports_size() {
        let env = TestEnv::new();
        env.touch_cache();

        let result = status(&resolved(&env, SnipSettings::new()));
        assert_eq!(result.state, CacheState::Present);
        assert_eq!(result.size_bytes, Some(2));
        assert!(result.modified.is_some());
    }

    #[test]
    fn test_status_missing() {
        let env = TestEnv::new();
        let result = status(&resolved(&env, SnipSettings::new()));
        assert_eq!(result.state, CacheState::Missing);

        let json: serde_json::Value = serde_json::from_str(&result.to_json()).unwrap();
        assert_eq!(json["state"], "missing");
        assert!(json.get("size_bytes").is_none());
    }

    #[test]
    fn test_config_init_writes_sources() {
        let env = TestEnv::new();
        let result = config_init(env.path(), vec!["src/lib.rs".to_string()], false).unwrap();

        let written = crate::config::read_settings_file(&result.path)
            .unwrap()
            .unwrap();
        assert_eq!(written.source, strings(&["src/lib.rs"]));

        let err = config_init(env.path(), Vec::new(), false).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(config_init(env.path(), Vec::new(), true).is_ok());
    }

    #[tokio::test]
    async fn test_bundle_inserts_into_file() {
        let env = TestEnv::new();
        env.touch_cache();
        let file = env.path().join("main.rs");
        std::fs::write(&file, "// codesnip-guard: dsu\nfn main() {}\n").unwrap();

        let runner = ScriptedRunner::new().push(Ok(ToolOutput::success("fn seg() {}\n\n")));
        let mut orchestrator = CacheOrchestrator::new(
            Arc::new(resolve(&env, SnipSettings::new())),
            runner,
        );

        let target = BundleTarget {
            file: Some(file.clone()),
            selection: None,
            write: true,
        };
        let result = bundle(&mut orchestrator, "seg", target).await.unwrap();

        assert!(result.written);
        assert_eq!(result.guards, vec!["dsu"]);
        assert_eq!(
            std::fs::read_to_string(&file).unwrap(),
            "// codesnip-guard: dsu\nfn main() {}\nfn seg() {}\n"
        );
        assert!(orchestrator.runner().calls()[0].ends_with(r#"bundle "seg" -e="dsu""#));
    }

    #[tokio::test]
    async fn test_bundle_cursor_without_selection_appends() {
        let env = TestEnv::new();
        env.touch_cache();
        let file = env.path().join("main.rs");
        std::fs::write(&file, "fn main() {}\n").unwrap();

        let settings = SnipSettings {
            insertion_position: Some("cursor".to_string()),
            ..Default::default()
        };
        let runner = ScriptedRunner::new().push(Ok(ToolOutput::success("fn seg() {}")));
        let mut orchestrator = CacheOrchestrator::new(Arc::new(resolve(&env, settings)), runner);

        let target = BundleTarget {
            file: Some(file.clone()),
            ..Default::default()
        };
        let result = bundle(&mut orchestrator, "seg", target).await.unwrap();

        assert!(!result.written);
        assert_eq!(result.position, Some(InsertionPosition::End));
        assert_eq!(result.document.as_deref(), Some("fn main() {}\nfn seg() {}\n"));
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "fn main() {}\n");
    }

    #[tokio::test]
    async fn test_bundle_write_without_file_rejected() {
        let env = TestEnv::new();
        env.touch_cache();
        let mut orchestrator = CacheOrchestrator::new(
            Arc::new(resolve(&env, SnipSettings::new())),
            ScriptedRunner::new(),
        );

        let target = BundleTarget {
            write: true,
            ..Default::default()
        };
        let err = bundle(&mut orchestrator, "seg", target).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(orchestrator.runner().calls().is_empty());
    }

    #[tokio::test]
    async fn test_update_result_reports_failed_verify() {
        let env = TestEnv::new();
        let settings = SnipSettings {
            source: strings(&["src/lib.rs"]),
            auto_verify_after_update: Some(true),
            ..Default::default()
        };
        let runner = ScriptedRunner::new()
            .push(Ok(ToolOutput::success("")))
            .push(Ok(ToolOutput::failure(1, "error: mismatched types")));
        let mut orchestrator = CacheOrchestrator::new(Arc::new(resolve(&env, settings)), runner);

        let result = update(&mut orchestrator).await.unwrap();
        assert!(!result.is_success());
        assert!(result.to_human().contains("mismatched types"));
    }

    #[tokio::test]
    async fn test_settings_change_swaps_snapshot() {
        let env = TestEnv::new();
        let mut orchestrator = CacheOrchestrator::new(
            Arc::new(resolve(&env, SnipSettings::new())),
            installed_tool(),
        );

        let other = env.path().join("other.bin");
        std::fs::write(&other, "{}").unwrap();
        let change = SettingsChange::Resolved(resolved(
            &env,
            SnipSettings {
                cache_file: Some(other.display().to_string()),
                ..Default::default()
            },
        ));

        match apply_settings_change(&mut orchestrator, change).await {
            WatchEvent::Reloaded { cache_file, cache } => {
                assert_eq!(cache_file, other);
                assert_eq!(cache, EnsureOutcome::Present);
            }
            event => panic!("unexpected event: {event:?}"),
        }
        assert_eq!(orchestrator.state(), CacheState::Present);
    }

    #[tokio::test]
    async fn test_unchanged_settings_rechecks_deleted_cache() {
        let env = TestEnv::new();
        env.touch_cache();
        let mut orchestrator = CacheOrchestrator::new(
            Arc::new(resolve(&env, SnipSettings::new())),
            installed_tool(),
        );
        assert_eq!(
            orchestrator.ensure_cache(false).await.unwrap(),
            EnsureOutcome::Present
        );

        std::fs::remove_file(env.cache_path()).unwrap();
        let change = SettingsChange::Resolved(resolved(&env, SnipSettings::new()));

        match apply_settings_change(&mut orchestrator, change).await {
            WatchEvent::Reloaded { cache, .. } => assert_eq!(cache, EnsureOutcome::Missing),
            event => panic!("unexpected event: {event:?}"),
        }
        assert_eq!(orchestrator.state(), CacheState::Missing);
    }

    #[tokio::test]
    async fn test_failed_settings_change_keeps_snapshot() {
        let env = TestEnv::new();
        let config = Arc::new(resolve(&env, SnipSettings::new()));
        let mut orchestrator = CacheOrchestrator::new(config.clone(), ScriptedRunner::new());

        let change = SettingsChange::Failed(Error::Settings {
            path: env.path().join("codesnip.kdl"),
            message: "unexpected token".to_string(),
        });
        let event = apply_settings_change(&mut orchestrator, change).await;

        assert!(matches!(event, WatchEvent::Failed(_)));
        assert_eq!(orchestrator.config(), &config);
        assert!(orchestrator.runner().calls().is_empty());
    }
}

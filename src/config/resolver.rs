//! Resolving settings layers into an immutable [`Configuration`].
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (passed at runtime)
//! 2. Project settings (`<project-root>/codesnip.kdl`)
//! 3. System settings (`$CSB_CONFIG_DIR/config.kdl`, else
//!    `~/.config/codesnip-bridge/config.kdl`)
//! 4. Built-in defaults
//!
//! [`Configuration::resolve`] is the pure final step: it only fills defaults
//! and never touches the filesystem.

use std::path::{Path, PathBuf};

use kdl::KdlDocument;
use serde::Serialize;

use crate::config::{InsertionPosition, SnipSettings};
use crate::tool::Version;
use crate::{Error, Result};

/// Default cache location, relative to the project root.
pub const DEFAULT_CACHE_SUBPATH: &str = "target/codesnip/codesnip-cache.bin";

/// Project-level settings file name.
pub const PROJECT_SETTINGS_FILE: &str = "codesnip.kdl";

/// System-level settings file name.
pub const SYSTEM_SETTINGS_FILE: &str = "config.kdl";

/// Environment variable overriding the system settings directory.
pub const CONFIG_DIR_ENV: &str = "CSB_CONFIG_DIR";

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueSource {
    /// Value from CLI flag
    #[serde(rename = "cli")]
    CliFlag,
    /// Value from the project settings file
    Project,
    /// Value from the system settings file
    System,
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::Project => write!(f, "project"),
            ValueSource::System => write!(f, "system"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

/// The external tool: a program plus fixed leading arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for ToolSpec {
    fn default() -> Self {
        Self {
            program: "cargo".to_string(),
            args: vec!["codesnip".to_string()],
        }
    }
}

impl ToolSpec {
    /// Human-readable name, e.g. `cargo codesnip`.
    pub fn display_name(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Immutable configuration snapshot.
///
/// Replaced wholesale whenever settings change; never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Configuration {
    pub cache_file: PathBuf,
    pub source: Vec<String>,
    pub cfg: Vec<String>,
    pub filter_item: Vec<String>,
    pub filter_attr: Vec<String>,
    pub minify: bool,
    pub not_hide: bool,
    pub insertion_position: InsertionPosition,
    pub toolchain: Option<String>,
    pub edition: Option<String>,
    pub verbose: bool,
    pub auto_update_on_missing_cache: bool,
    pub auto_verify_after_update: bool,
    pub tool: ToolSpec,
    pub min_tool_version: Option<Version>,
}

impl Configuration {
    /// Fill defaults into raw settings.
    ///
    /// The resolved cache path is always absolute. An absolute `cache-file` is
    /// used verbatim and a relative one is taken from `project_root`. Without
    /// one, the cache lives at [`DEFAULT_CACHE_SUBPATH`] under `project_root`.
    /// A path that cannot be made absolute fails with
    /// [`Error::NoCacheFileConfigured`].
    pub fn resolve(raw: &SnipSettings, project_root: Option<&Path>) -> Result<Self> {
        let cache_file = match raw.cache_file.as_deref().filter(|s| !s.is_empty()) {
            Some(path) if Path::new(path).is_absolute() => PathBuf::from(path),
            Some(path) => project_root
                .map(|root| root.join(path))
                .ok_or(Error::NoCacheFileConfigured)?,
            None => project_root
                .map(|root| root.join(DEFAULT_CACHE_SUBPATH))
                .ok_or(Error::NoCacheFileConfigured)?,
        };

        let tool = match raw.tool.as_deref() {
            Some([program, args @ ..]) => ToolSpec {
                program: program.clone(),
                args: args.to_vec(),
            },
            _ => ToolSpec::default(),
        };

        let min_tool_version = raw
            .min_tool_version
            .as_deref()
            .map(str::parse::<Version>)
            .transpose()?;

        Ok(Self {
            cache_file,
            source: raw.source.clone().unwrap_or_default(),
            cfg: raw.cfg.clone().unwrap_or_default(),
            filter_item: raw.filter_item.clone().unwrap_or_default(),
            filter_attr: raw.filter_attr.clone().unwrap_or_default(),
            minify: raw.minify.unwrap_or(false),
            not_hide: raw.not_hide.unwrap_or(false),
            insertion_position: raw
                .insertion_position
                .as_deref()
                .map(InsertionPosition::parse)
                .unwrap_or_default(),
            toolchain: raw.toolchain.clone(),
            edition: raw.edition.clone(),
            verbose: raw.verbose.unwrap_or(false),
            auto_update_on_missing_cache: raw.auto_update_on_missing_cache.unwrap_or(false),
            auto_verify_after_update: raw.auto_verify_after_update.unwrap_or(false),
            tool,
            min_tool_version,
        })
    }

    /// The cache path as passed on the tool's command line.
    pub fn cache_path_string(&self) -> String {
        self.cache_file.to_string_lossy().into_owned()
    }
}

/// CLI overrides for configuration resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Cache file override from CLI flag
    pub cache_file: Option<PathBuf>,
}

impl ConfigOverrides {
    /// Create empty overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set cache file override.
    pub fn with_cache_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_file = Some(path.into());
        self
    }

    fn as_settings(&self) -> SnipSettings {
        SnipSettings {
            cache_file: self
                .cache_file
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            ..SnipSettings::default()
        }
    }
}

/// A configuration snapshot together with where it came from.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    pub config: Configuration,
    /// Where the cache path came from
    pub cache_file_source: ValueSource,
    /// Settings files that existed and were read, lowest precedence first
    pub settings_files: Vec<PathBuf>,
}

/// Load every settings layer and resolve the snapshot.
pub fn resolve_config(
    project_root: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<ResolvedConfig> {
    let mut merged = SnipSettings::new();
    let mut settings_files = Vec::new();
    let mut cache_file_source = ValueSource::Default;

    let mut layers = Vec::new();
    if let Some(path) = system_settings_path() {
        layers.push((path, ValueSource::System));
    }
    if let Some(root) = project_root {
        layers.push((project_settings_path(root), ValueSource::Project));
    }

    for (path, source) in layers {
        if let Some(layer) = read_settings_file(&path)? {
            if layer.cache_file.as_deref().is_some_and(|s| !s.is_empty()) {
                cache_file_source = source;
            }
            merged.merge(&layer);
            settings_files.push(path);
        }
    }

    let cli = overrides.as_settings();
    if cli.cache_file.as_deref().is_some_and(|s| !s.is_empty()) {
        cache_file_source = ValueSource::CliFlag;
    }
    merged.merge(&cli);

    let config = Configuration::resolve(&merged, project_root)?;
    tracing::debug!(
        cache_file = %config.cache_file.display(),
        source = %cache_file_source,
        "resolved configuration"
    );

    Ok(ResolvedConfig {
        config,
        cache_file_source,
        settings_files,
    })
}

/// Read one settings file; `Ok(None)` when it does not exist.
pub fn read_settings_file(path: &Path) -> Result<Option<SnipSettings>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)?;
    let doc: KdlDocument = content.parse().map_err(|e: kdl::KdlError| Error::Settings {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    Ok(Some(SnipSettings::from_kdl(&doc)))
}

/// Write project settings, refusing to clobber an existing file unless `force`.
pub fn write_project_settings(
    project_root: &Path,
    settings: &SnipSettings,
    force: bool,
) -> Result<PathBuf> {
    let path = project_settings_path(project_root);
    if path.exists() && !force {
        return Err(Error::InvalidInput(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }

    let mut doc = settings.to_kdl();
    doc.autoformat();
    std::fs::write(&path, doc.to_string())?;
    Ok(path)
}

/// Path of the project settings file.
pub fn project_settings_path(project_root: &Path) -> PathBuf {
    project_root.join(PROJECT_SETTINGS_FILE)
}

/// Path of the system settings file, if a config directory is known.
pub fn system_settings_path() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        if !dir.is_empty() {
            return Some(PathBuf::from(dir).join(SYSTEM_SETTINGS_FILE));
        }
    }
    dirs::config_dir().map(|dir| dir.join("codesnip-bridge").join(SYSTEM_SETTINGS_FILE))
}

/// Find the project root for `start`.
///
/// The nearest ancestor (including `start`) holding a project settings file
/// or a `.git` entry wins.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(PROJECT_SETTINGS_FILE).exists() || dir.join(".git").exists())
        .map(Path::to_path_buf)
}

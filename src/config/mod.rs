//! Configuration for codesnip-bridge.
//!
//! Settings are written in KDL in two places:
//!
//! ## codesnip.kdl - project settings
//!
//! Located at the project root. Usually holds the source targets and the
//! filters for the project's snippet library.
//!
//! ## config.kdl - system settings
//!
//! Located at `~/.config/codesnip-bridge/config.kdl` (or under
//! `$CSB_CONFIG_DIR`). Usually holds personal preferences such as the
//! insertion position or the verify toolchain.
//!
//! ## Precedence
//!
//! CLI flag > project settings > system settings > defaults
//!
//! Use the [`resolver`] module for precedence resolution and [`watcher`] to
//! follow changes.

pub mod resolver;
pub mod schema;
pub mod watcher;

pub use resolver::{
    CONFIG_DIR_ENV, ConfigOverrides, Configuration, DEFAULT_CACHE_SUBPATH,
    PROJECT_SETTINGS_FILE, ResolvedConfig, SYSTEM_SETTINGS_FILE, ToolSpec, ValueSource,
    find_project_root, project_settings_path, read_settings_file, resolve_config,
    system_settings_path, write_project_settings,
};
pub use schema::{InsertionPosition, SnipSettings};
pub use watcher::{SettingsChange, SettingsWatcher, watch_settings};

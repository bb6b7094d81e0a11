//! Common test utilities for csb integration tests.
//!
//! Provides `TestEnv` for isolated test environments that neither read the
//! user's `~/.config/codesnip-bridge/` nor run the real `cargo codesnip`.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use assert_cmd::Command;
pub use tempfile::TempDir;

/// Version reported by the fake `cargo codesnip --version`.
pub const FAKE_TOOL_VERSION: &str = "0.4.1";

/// A fake `cargo` that understands the subcommands csb uses.
///
/// Every invocation is appended to `$FAKE_CARGO_LOG`. `cache` writes the
/// cache file, `list` prints three names, `bundle NAME` prints a guarded
/// function, and `verify` fails when `$FAKE_VERIFY_FAIL` is set.
#[cfg(unix)]
const FAKE_CARGO: &str = r#"#!/bin/sh
printf '%s\n' "$*" >> "$FAKE_CARGO_LOG"
if [ "$1" = "--version" ]; then
    echo "cargo 1.85.0 (fake)"
    exit 0
fi
if [ "$1" != "codesnip" ]; then
    echo "error: no such command: \`$1\`" >&2
    exit 101
fi
shift
while [ $# -gt 0 ]; do
    case "$1" in
        --version)
            echo "cargo-codesnip 0.4.1"
            exit 0
            ;;
        cache)
            mkdir -p "$(dirname "$2")"
            printf '{}' > "$2"
            exit 0
            ;;
        list)
            echo "alpha beta gamma"
            exit 0
            ;;
        bundle)
            echo "// codesnip-guard: $2"
            echo "fn $2() {}"
            exit 0
            ;;
        verify)
            if [ -n "$FAKE_VERIFY_FAIL" ]; then
                echo "error[E0308]: mismatched types" >&2
                exit 1
            fi
            echo "verified"
            exit 0
            ;;
    esac
    shift
done
echo "error: unexpected arguments" >&2
exit 2
"#;

/// A test environment with an isolated project and settings directory.
///
/// Each `TestEnv` creates temporary directories for:
/// - `project_dir`: the project root (passed via `CSB_PROJECT`)
/// - `config_dir`: system settings (via `CSB_CONFIG_DIR`)
/// - `bin_dir`: holds the fake `cargo`, prepended to `PATH`
pub struct TestEnv {
    pub project_dir: TempDir,
    pub config_dir: TempDir,
    pub bin_dir: TempDir,
}

impl TestEnv {
    /// Create a new test environment with isolated directories.
    pub fn new() -> Self {
        let env = Self {
            project_dir: TempDir::new().unwrap(),
            config_dir: TempDir::new().unwrap(),
            bin_dir: TempDir::new().unwrap(),
        };
        #[cfg(unix)]
        env.install_fake_cargo();
        env
    }

    /// Create a new test environment with a project settings file.
    pub fn with_settings(kdl: &str) -> Self {
        let env = Self::new();
        env.write_project_settings(kdl);
        env
    }

    #[cfg(unix)]
    fn install_fake_cargo(&self) {
        use std::os::unix::fs::PermissionsExt;

        let path = self.bin_dir.path().join("cargo");
        std::fs::write(&path, FAKE_CARGO).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    /// Get a Command for the csb binary bound to the project.
    pub fn csb(&self) -> Command {
        let mut cmd = self.csb_outside_project();
        cmd.env("CSB_PROJECT", self.project_dir.path());
        cmd
    }

    /// Get a Command for the csb binary with no project root.
    pub fn csb_outside_project(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_csb"));
        cmd.current_dir(self.config_dir.path());
        cmd.env_remove("CSB_PROJECT");
        cmd.env_remove("CSB_LOG");
        cmd.env_remove("FAKE_VERIFY_FAIL");
        cmd.env("CSB_CONFIG_DIR", self.config_dir.path());
        cmd.env("FAKE_CARGO_LOG", self.log_path());
        cmd.env("PATH", self.path_with_fake_cargo());
        cmd
    }

    fn path_with_fake_cargo(&self) -> std::ffi::OsString {
        let mut paths = vec![self.bin_dir.path().to_path_buf()];
        if let Some(existing) = std::env::var_os("PATH") {
            paths.extend(std::env::split_paths(&existing));
        }
        std::env::join_paths(paths).unwrap()
    }

    /// Get the path to the project directory.
    pub fn path(&self) -> &Path {
        self.project_dir.path()
    }

    /// Default cache location inside the project.
    pub fn cache_path(&self) -> PathBuf {
        self.path().join("target/codesnip/codesnip-cache.bin")
    }

    /// Create the cache file as `cargo codesnip cache` would.
    pub fn touch_cache(&self) {
        let path = self.cache_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "{}").unwrap();
    }

    pub fn write_project_settings(&self, kdl: &str) {
        std::fs::write(self.path().join("codesnip.kdl"), kdl).unwrap();
    }

    pub fn write_system_settings(&self, kdl: &str) {
        std::fs::write(self.config_dir.path().join("config.kdl"), kdl).unwrap();
    }

    fn log_path(&self) -> PathBuf {
        self.bin_dir.path().join("calls.log")
    }

    /// Arguments of every fake `cargo` invocation so far, one per line.
    pub fn cargo_calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.log_path())
            .map(|log| log.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a command's stdout as JSON.
pub fn parse_json(output: &[u8]) -> serde_json::Value {
    serde_json::from_slice(output).unwrap()
}

/// Parse the JSON error report csb writes as the last line of stderr.
///
/// Earlier lines may hold log output.
pub fn parse_error(stderr: &[u8]) -> serde_json::Value {
    let text = String::from_utf8_lossy(stderr);
    let last = text.lines().rev().find(|l| !l.trim().is_empty()).unwrap();
    serde_json::from_str(last).unwrap()
}

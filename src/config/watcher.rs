//! Settings file watcher.
//!
//! Re-resolves the configuration whenever a settings file changes and sends
//! the fresh snapshot (or the resolution error) over a channel. Consumers
//! swap the snapshot in; nothing is mutated in place.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::{ConfigOverrides, ResolvedConfig, resolve_config};
use crate::config::{project_settings_path, system_settings_path};
use crate::{Error, Result};

/// Debounce duration - wait this long after last event before re-resolving
const DEBOUNCE_MS: u64 = 100;

/// Outcome of re-resolving after a settings change.
#[derive(Debug)]
pub enum SettingsChange {
    Resolved(ResolvedConfig),
    Failed(Error),
}

/// Keeps the underlying file watcher alive; dropping it ends the stream.
pub struct SettingsWatcher {
    _watcher: RecommendedWatcher,
    watched: Vec<PathBuf>,
}

impl SettingsWatcher {
    /// Settings files being watched.
    pub fn watched_files(&self) -> &[PathBuf] {
        &self.watched
    }
}

/// Start watching the project and system settings files.
///
/// Must be called from within a tokio runtime.
pub fn watch_settings(
    project_root: Option<PathBuf>,
    overrides: ConfigOverrides,
) -> Result<(SettingsWatcher, mpsc::Receiver<SettingsChange>)> {
    let mut files = Vec::new();
    if let Some(path) = system_settings_path() {
        files.push(path);
    }
    if let Some(ref root) = project_root {
        files.push(project_settings_path(root));
    }

    let names: Vec<OsString> = files
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_os_string()))
        .collect();

    let (raw_tx, mut raw_rx) = mpsc::channel::<()>(100);
    let mut watcher = RecommendedWatcher::new(
        move |res: std::result::Result<Event, notify::Error>| {
            if let Ok(event) = res {
                let relevant = event.paths.iter().any(|p| {
                    p.file_name()
                        .is_some_and(|name| names.iter().any(|n| n.as_os_str() == name))
                });
                if relevant {
                    let _ = raw_tx.blocking_send(());
                }
            }
        },
        Config::default(),
    )
    .map_err(|e| Error::Other(format!("Failed to create settings watcher: {}", e)))?;

    // Watch parent directories so that files created later are noticed too
    for file in &files {
        let Some(dir) = file.parent().filter(|d| d.is_dir()) else {
            tracing::debug!(path = %file.display(), "settings directory missing, not watching");
            continue;
        };
        watch_dir(&mut watcher, dir)?;
    }

    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        let mut pending_update = false;
        let mut last_event_time = Instant::now();

        loop {
            let timeout = if pending_update {
                let debounce = Duration::from_millis(DEBOUNCE_MS);
                debounce.saturating_sub(last_event_time.elapsed())
            } else {
                Duration::from_secs(3600)
            };

            tokio::select! {
                event = raw_rx.recv() => {
                    match event {
                        Some(()) => {
                            pending_update = true;
                            last_event_time = Instant::now();
                        }
                        None => break, // Watcher dropped
                    }
                }
                _ = tokio::time::sleep(timeout), if pending_update => {
                    pending_update = false;
                    let change = match resolve_config(project_root.as_deref(), &overrides) {
                        Ok(resolved) => SettingsChange::Resolved(resolved),
                        Err(e) => SettingsChange::Failed(e),
                    };
                    if tx.send(change).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    Ok((
        SettingsWatcher {
            _watcher: watcher,
            watched: files,
        },
        rx,
    ))
}

fn watch_dir(watcher: &mut RecommendedWatcher, dir: &Path) -> Result<()> {
    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .map_err(|e| Error::Other(format!("Failed to watch {}: {}", dir.display(), e)))
}

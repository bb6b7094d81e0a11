//! Cache lifecycle and the four snippet operations.
//!
//! [`CacheOrchestrator`] gates every operation on the presence of the cache
//! file, builds the tool invocation from the current [`Configuration`]
//! snapshot, and returns typed outcomes. Presenting those outcomes (or
//! inserting bundled text) is the caller's job.
//!
//! ## Cache states
//!
//! ```text
//! Unknown --check--> Missing | Present
//! Missing --update ok--> Present
//! ```
//!
//! The only chained operation is update followed by verify when
//! `auto-verify-after-update` is set. Nothing is retried.

use std::sync::Arc;

use serde::Serialize;

use crate::config::Configuration;
use crate::guard::scan_guards;
use crate::tool::{Invocation, ToolOutput, ToolRunner};
use crate::{Error, Result};

/// What is known about the cache file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    Unknown,
    Missing,
    Present,
}

impl std::fmt::Display for CacheState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheState::Unknown => write!(f, "unknown"),
            CacheState::Missing => write!(f, "missing"),
            CacheState::Present => write!(f, "present"),
        }
    }
}

/// Result of [`CacheOrchestrator::ensure_cache`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum EnsureOutcome {
    /// The cache already existed
    Present,
    /// The cache was missing and has been built
    Updated(UpdateOutcome),
    /// The cache is missing and no update was allowed; offer one
    Missing,
}

/// Result of a successful cache update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateOutcome {
    pub command: String,
    pub output: ToolOutput,
    /// Present when `auto-verify-after-update` chained a verify
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify: Option<VerifyReport>,
}

/// Result of a verify run. Produced for passing and failing runs alike.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub command: String,
    pub success: bool,
    pub output: ToolOutput,
}

/// A bundled snippet ready for insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bundled {
    pub name: String,
    /// Guard tokens passed as exclusions, in document order
    pub guards: Vec<String>,
    pub text: String,
}

/// Split `list` output into snippet names.
///
/// Names are separated by any ASCII whitespace, which accepts both the
/// space-separated and the line-separated output of the tool.
pub fn parse_snippet_names(stdout: &str) -> Vec<String> {
    stdout.split_ascii_whitespace().map(str::to_string).collect()
}

/// Drives the external tool against one cache file.
pub struct CacheOrchestrator<R> {
    config: Arc<Configuration>,
    runner: R,
    state: CacheState,
}

impl<R: ToolRunner> CacheOrchestrator<R> {
    pub fn new(config: Arc<Configuration>, runner: R) -> Self {
        Self {
            config,
            runner,
            state: CacheState::Unknown,
        }
    }

    /// The current configuration snapshot.
    pub fn config(&self) -> &Arc<Configuration> {
        &self.config
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn state(&self) -> CacheState {
        self.state
    }

    /// Swap in a new configuration snapshot.
    ///
    /// The cache state is forgotten, so the next operation looks at the disk
    /// again even when the cache path did not change.
    pub fn replace_config(&mut self, config: Arc<Configuration>) {
        self.state = CacheState::Unknown;
        self.config = config;
    }

    /// Look at the filesystem and record whether the cache exists.
    pub fn check_presence(&mut self) -> CacheState {
        self.state = if self.config.cache_file.is_file() {
            CacheState::Present
        } else {
            CacheState::Missing
        };
        self.state
    }

    /// Make sure the cache exists, building it when `force` or
    /// `auto-update-on-missing-cache` allows.
    pub async fn ensure_cache(&mut self, force: bool) -> Result<EnsureOutcome> {
        if self.state != CacheState::Present {
            self.check_presence();
        }
        if self.state == CacheState::Present {
            return Ok(EnsureOutcome::Present);
        }

        if !(force || self.config.auto_update_on_missing_cache) {
            tracing::info!(cache = %self.config.cache_file.display(), "cache not found");
            return Ok(EnsureOutcome::Missing);
        }

        let outcome = self.update_cache().await?;
        if self.check_presence() != CacheState::Present {
            return Err(Error::CacheMissing {
                path: self.config.cache_file.clone(),
            });
        }
        Ok(EnsureOutcome::Updated(outcome))
    }

    /// Rebuild the cache from the configured source targets.
    pub async fn update_cache(&mut self) -> Result<UpdateOutcome> {
        if self.config.source.is_empty() {
            return Err(Error::MissingSourceConfiguration);
        }

        let invocation = Invocation::update_cache(&self.config);
        tracing::info!(command = %invocation.build(), "updating snippet cache");
        let output = self.runner.run(&invocation).await?.check(&invocation)?;
        self.state = CacheState::Present;

        let verify = if self.config.auto_verify_after_update {
            Some(self.run_verify().await?)
        } else {
            None
        };

        Ok(UpdateOutcome {
            command: invocation.build(),
            output,
            verify,
        })
    }

    /// Verify that every cached snippet compiles.
    pub async fn verify(&mut self) -> Result<VerifyReport> {
        self.require_cache().await?;
        self.run_verify().await
    }

    /// Names of the cached snippets.
    pub async fn list(&mut self) -> Result<Vec<String>> {
        self.require_cache().await?;

        let invocation = Invocation::list(&self.config);
        let output = self.runner.run(&invocation).await?.check(&invocation)?;
        Ok(parse_snippet_names(&output.stdout))
    }

    /// Bundle `name`, excluding every guard already present in `document`.
    pub async fn bundle(&mut self, name: &str, document: Option<&str>) -> Result<Bundled> {
        self.require_cache().await?;

        let guards = document.map(scan_guards).unwrap_or_default();
        let invocation = Invocation::bundle(&self.config, name, &guards);
        tracing::debug!(name, guards = guards.len(), "bundling snippet");
        let output = self.runner.run(&invocation).await?.check(&invocation)?;

        Ok(Bundled {
            name: name.to_string(),
            guards,
            text: output.stdout,
        })
    }

    async fn require_cache(&mut self) -> Result<()> {
        match self.ensure_cache(false).await? {
            EnsureOutcome::Missing => Err(Error::CacheMissing {
                path: self.config.cache_file.clone(),
            }),
            EnsureOutcome::Present | EnsureOutcome::Updated(_) => Ok(()),
        }
    }

    async fn run_verify(&mut self) -> Result<VerifyReport> {
        let invocation = Invocation::verify(&self.config);
        tracing::info!(command = %invocation.build(), "verifying snippets");
        let output = self.runner.run(&invocation).await?;
        if !output.is_success() {
            tracing::warn!(code = ?output.code, "snippet verification failed");
        }

        Ok(VerifyReport {
            command: invocation.build(),
            success: output.is_success(),
            output,
        })
    }
}

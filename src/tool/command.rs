//! `cargo codesnip` command generation.
//!
//! This module provides a builder for the external tool's invocations. It
//! does not execute anything; [`Invocation::argv`] is what gets spawned and
//! [`Invocation::build`] is the flat command line shown to users and logs.
//!
//! Token order is part of the contract with the tool's argument parser:
//! targets, cfgs, filter items, filter attributes, format flags, then the
//! operation and its trailing arguments.

use crate::config::{Configuration, ToolSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    /// Quote only values containing whitespace (or empty values)
    IfNeeded,
    /// Always quote the value when rendering
    Always,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    prefix: String,
    value: Option<String>,
    quote: Quote,
}

impl Token {
    fn argv(&self) -> String {
        match &self.value {
            Some(value) => format!("{}{}", self.prefix, value),
            None => self.prefix.clone(),
        }
    }

    fn render(&self) -> String {
        match &self.value {
            Some(value) if self.quote == Quote::Always || needs_quoting(value) => {
                format!("{}{}", self.prefix, quote(value))
            }
            Some(value) => format!("{}{}", self.prefix, value),
            None if self.quote == Quote::Always || needs_quoting(&self.prefix) => {
                quote(&self.prefix)
            }
            None => self.prefix.clone(),
        }
    }
}

fn needs_quoting(value: &str) -> bool {
    value.is_empty() || value.chars().any(char::is_whitespace)
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Builder for external tool invocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    tokens: Vec<Token>,
}

impl Invocation {
    /// Start an invocation of the bare program (no fixed leading arguments).
    fn program_only(program: &str) -> Self {
        Self {
            program: program.to_string(),
            tokens: Vec::new(),
        }
    }

    /// Start an invocation of the configured tool (`cargo codesnip`).
    fn new(tool: &ToolSpec) -> Self {
        tool.args
            .iter()
            .fold(Self::program_only(&tool.program), |cmd, arg| cmd.arg(arg))
    }

    fn push(mut self, prefix: &str, value: Option<&str>, quote: Quote) -> Self {
        self.tokens.push(Token {
            prefix: prefix.to_string(),
            value: value.map(str::to_string),
            quote,
        });
        self
    }

    /// Add a bare flag or positional argument.
    fn arg(self, arg: &str) -> Self {
        self.push(arg, None, Quote::IfNeeded)
    }

    /// Add a positional argument that is always rendered quoted.
    fn quoted_arg(self, arg: &str) -> Self {
        self.push(arg, None, Quote::Always)
    }

    /// Add a `<flag>=<value>` token.
    fn flag_with_value(self, flag: &str, value: &str) -> Self {
        self.push(&format!("{}=", flag), Some(value), Quote::IfNeeded)
    }

    /// Add a `<flag>="<value>"` token.
    fn flag_with_quoted_value(self, flag: &str, value: &str) -> Self {
        self.push(&format!("{}=", flag), Some(value), Quote::Always)
    }

    fn use_cache(config: &Configuration) -> Self {
        Self::new(&config.tool).flag_with_value("--use-cache", &config.cache_path_string())
    }

    /// The program that gets spawned.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments passed to the program, unquoted.
    pub fn argv(&self) -> Vec<String> {
        self.tokens.iter().map(Token::argv).collect()
    }

    /// Render the flat command line.
    pub fn build(&self) -> String {
        std::iter::once(self.program.clone())
            .chain(self.tokens.iter().map(Token::render))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Build the snippet cache from the configured source targets.
    ///
    /// # Example
    /// ```
    /// use codesnip_bridge::config::{Configuration, SnipSettings};
    /// use codesnip_bridge::tool::Invocation;
    ///
    /// let settings = SnipSettings {
    ///     cache_file: Some("/p/cache.bin".to_string()),
    ///     source: Some(vec!["src/lib.rs".to_string()]),
    ///     minify: Some(true),
    ///     ..Default::default()
    /// };
    /// let config = Configuration::resolve(&settings, None).unwrap();
    /// assert_eq!(
    ///     Invocation::update_cache(&config).build(),
    ///     r#"cargo codesnip -t=src/lib.rs --format=minify cache "/p/cache.bin""#
    /// );
    /// ```
    pub fn update_cache(config: &Configuration) -> Self {
        let mut cmd = Self::new(&config.tool);
        for target in &config.source {
            cmd = cmd.flag_with_value("-t", target);
        }
        for cfg in &config.cfg {
            cmd = cmd.flag_with_value("--cfg", cfg);
        }
        for item in &config.filter_item {
            cmd = cmd.flag_with_value("--filter-item", item);
        }
        for attr in &config.filter_attr {
            cmd = cmd.flag_with_value("--filter-attr", attr);
        }
        if config.minify {
            cmd = cmd.flag_with_value("--format", "minify");
        }
        cmd.arg("cache").quoted_arg(&config.cache_path_string())
    }

    /// Verify every snippet in the cache compiles.
    pub fn verify(config: &Configuration) -> Self {
        let mut cmd = Self::use_cache(config).arg("verify");
        if let Some(ref toolchain) = config.toolchain {
            cmd = cmd.flag_with_value("--toolchain", toolchain);
        }
        if let Some(ref edition) = config.edition {
            cmd = cmd.flag_with_value("--edition", edition);
        }
        if config.verbose {
            cmd = cmd.arg("--verbose");
        }
        cmd
    }

    /// List snippet names in the cache.
    pub fn list(config: &Configuration) -> Self {
        let mut cmd = Self::use_cache(config).arg("list");
        if config.not_hide {
            cmd = cmd.arg("--not-hide");
        }
        cmd
    }

    /// Bundle a snippet, excluding every guard already present in the target.
    pub fn bundle(config: &Configuration, name: &str, guards: &[String]) -> Self {
        let cmd = Self::use_cache(config).arg("bundle").quoted_arg(name);
        guards
            .iter()
            .fold(cmd, |cmd, guard| cmd.flag_with_quoted_value("-e", guard))
    }

    /// `<program> --version`, e.g. `cargo --version`.
    pub fn program_version(tool: &ToolSpec) -> Self {
        Self::program_only(&tool.program).arg("--version")
    }

    /// `<tool> --version`, e.g. `cargo codesnip --version`.
    pub fn tool_version(tool: &ToolSpec) -> Self {
        Self::new(tool).arg("--version")
    }
}

//! CLI argument definitions for csb.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::document::Selection;

/// csb - drive `cargo codesnip` without an editor.
///
/// Start with `csb doctor` to check the toolchain, then `csb update` to build
/// the snippet cache.
#[derive(Parser, Debug)]
#[command(name = "csb")]
#[command(author, version, about = "Build, list, verify and bundle cargo-codesnip snippets", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Use <path> as the project root instead of searching upward from the
    /// current directory. The path must exist.
    /// Can also be set via CSB_PROJECT environment variable.
    #[arg(short = 'C', long = "project", global = true, env = "CSB_PROJECT")]
    pub project_path: Option<PathBuf>,

    /// Cache file to use, overriding every settings file
    #[arg(long = "cache-file", global = true, value_name = "PATH")]
    pub cache_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check cargo and cargo-codesnip, and summarize the configuration
    Doctor,

    /// Settings commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Show whether the snippet cache exists
    Status,

    /// Make sure the snippet cache exists
    ///
    /// Builds the cache only when `auto-update-on-missing-cache` is set or
    /// --force is given.
    Ensure {
        /// Build the cache if it is missing
        #[arg(long)]
        force: bool,
    },

    /// Rebuild the snippet cache from the source targets
    Update,

    /// Check that every cached snippet compiles (exit status 1 on failure)
    Verify,

    /// List snippet names in the cache
    List,

    /// Bundle a snippet
    ///
    /// With --file, guard comments already in the file are excluded and the
    /// snippet is inserted at the configured position.
    Bundle {
        /// Snippet name (see `csb list`)
        name: String,

        /// Target document (scanned for guards and receiving the snippet)
        #[arg(short, long, value_name = "PATH")]
        file: Option<PathBuf>,

        /// Byte offset or START..END range for cursor insertion
        #[arg(short, long, value_name = "S[..E]", requires = "file")]
        selection: Option<Selection>,

        /// Write the updated document back to --file instead of printing it
        #[arg(short, long, requires = "file")]
        write: bool,
    },

    /// Follow settings changes and keep the cache checked until Ctrl-C
    Watch,
}

/// Settings subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the resolved configuration and where the cache path came from
    Show,

    /// Write a starter codesnip.kdl in the project root
    Init {
        /// Source target (repeatable)
        #[arg(long = "source", short = 't', value_name = "FILE")]
        source: Vec<String>,

        /// Overwrite an existing codesnip.kdl
        #[arg(long)]
        force: bool,
    },
}

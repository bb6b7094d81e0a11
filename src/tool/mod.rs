//! The external `cargo codesnip` tool.
//!
//! - [`command`] builds invocations
//! - [`runner`] executes them
//! - [`prereq`] checks that the tool is installed
//! - [`version`] parses and compares tool versions

pub mod command;
pub mod prereq;
pub mod runner;
pub mod version;

pub use command::Invocation;
pub use prereq::{ToolInfo, check_prerequisites};
pub use runner::{ProcessRunner, ToolOutput, ToolRunner};
pub use version::Version;

//! Remote shell commands
//!
//! This module handles:
//! - Collecting and filtering line-oriented shell output
//! - Formatting the fixed set of supported requests
//! - Parsing collected output into typed results

mod collector;
mod shell;

pub use collector::ResultCollector;
pub use shell::{
    CommandError, CommandKind, CommandOutput, InterfaceInfo, SettingsNamespace, ShellCommand,
};

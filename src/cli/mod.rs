//! CLI-specific functionality for shellpark
//!
//! This module contains argument parsing, configuration discovery and the
//! administrative commands run against the on-disk session store.

pub mod args;
pub mod commands;
pub mod config;

pub use args::{AdminCommand, Args, ExecutionMode};
pub use commands::{AdminOutcome, FAILURE_EXIT_CODE, admin_suspend_config, execute};
pub use config::{ConfigDiscovery, ConfigError, ShellparkConfig};

//! Environment constants and path utilities for shellpark.
//!
//! This module centralizes the on-disk layout: where suspended-session logs and
//! sidecar records live, and where configuration files are discovered.

use std::path::{Path, PathBuf};

/// Main application directory name (hidden directory like .git, .vscode)
pub const SHELLPARK_DIR_NAME: &str = ".shellpark";

/// Configuration file name inside the application directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration file name looked up directly in the current directory
pub const LOCAL_CONFIG_FILE_NAME: &str = "shellpark.toml";

/// Suspended-session storage names
pub mod suspend {
    /// Directory holding session logs and sidecar records
    pub const SUSPENDED_DIR_NAME: &str = "suspended";

    /// Extension of raw session log files (keyed by log key)
    pub const LOG_FILE_EXTENSION: &str = "log";

    /// Extension of sidecar metadata files (keyed by suspend id)
    pub const METADATA_FILE_EXTENSION: &str = "json";

    /// Extension used for in-flight metadata writes
    pub const TEMP_FILE_EXTENSION: &str = "tmp";

    /// Once a log reaches this size the next chunk overwrites it (100 MiB)
    pub const DEFAULT_MAX_LOG_BYTES: u64 = 100 * 1024 * 1024;

    /// Buffered notifications per subscriber before lagging
    pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 256;
}

/// Build the main .shellpark directory path from a base directory
pub fn shellpark_dir_path(base: &Path) -> PathBuf {
    base.join(SHELLPARK_DIR_NAME)
}

/// Build the suspended-session storage directory from a base directory
pub fn suspended_dir_path(base: &Path) -> PathBuf {
    shellpark_dir_path(base).join(suspend::SUSPENDED_DIR_NAME)
}

/// Build a log file path inside the storage directory
pub fn log_file_path(data_dir: &Path, log_key: &str) -> PathBuf {
    data_dir.join(format!("{}.{}", log_key, suspend::LOG_FILE_EXTENSION))
}

/// Build a sidecar metadata file path inside the storage directory
pub fn metadata_file_path(data_dir: &Path, suspend_id: &str) -> PathBuf {
    data_dir.join(format!("{}.{}", suspend_id, suspend::METADATA_FILE_EXTENSION))
}

/// Build config directory path in user's home directory
pub fn user_config_dir_path(home_dir: &Path) -> PathBuf {
    shellpark_dir_path(home_dir)
}

/// Build config file path in user's home directory
pub fn user_config_file_path(home_dir: &Path) -> PathBuf {
    user_config_dir_path(home_dir).join(CONFIG_FILE_NAME)
}

/// Build local config file path in current directory
pub fn local_config_file_path(current_dir: &Path) -> PathBuf {
    shellpark_dir_path(current_dir).join(CONFIG_FILE_NAME)
}

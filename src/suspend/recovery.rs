use crate::suspend::log_store::LogStore;
use crate::suspend::metadata::{SessionStatus, SuspendedSession};
use crate::suspend::registry::SessionRegistry;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Outcome of reloading persisted session records at startup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// Sidecar records added to the registry
    pub loaded: u32,
    /// Sidecars rejected as malformed or unreadable
    pub skipped_invalid: u32,
    /// Sidecars whose id was already registered
    pub already_present: u32,
    /// Logs with no record pointing at them
    pub orphaned_logs: Vec<String>,
    /// Orphaned logs deleted during this reload
    pub purged_logs: u32,
}

/// Options for [`reload_persisted`]
#[derive(Debug, Clone, Default)]
pub struct RecoveryOptions {
    pub purge_orphaned_logs: bool,
}

/// Repopulate the registry with detached records for every valid sidecar on disk.
///
/// Live SSH handles cannot survive a restart; the reloaded entries exist so
/// users can still list, export and clean up what they had.
pub async fn reload_persisted(
    log_store: &LogStore,
    registry: &mut SessionRegistry,
    options: &RecoveryOptions,
) -> RecoveryReport {
    let mut report = RecoveryReport::default();

    for suspend_id in log_store.list_metadata_keys().await {
        let mut record = match log_store.read_metadata(&suspend_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                report.skipped_invalid += 1;
                continue;
            }
            Err(e) => {
                warn!("Skipping unreadable metadata {}: {:#}", suspend_id, e);
                report.skipped_invalid += 1;
                continue;
            }
        };

        if registry.contains(&record.suspend_id) {
            debug!("Metadata {} already registered", suspend_id);
            report.already_present += 1;
            continue;
        }

        record.status = SessionStatus::Disconnected;
        match registry.insert(SuspendedSession::Detached { record }) {
            Ok(()) => report.loaded += 1,
            Err(e) => {
                warn!("Failed to register persisted session: {}", e);
                report.already_present += 1;
            }
        }
    }

    let referenced = registry.log_keys();
    for log_key in log_store.list_log_keys().await {
        if referenced.contains(&log_key) {
            continue;
        }

        if options.purge_orphaned_logs {
            match log_store.delete(&log_key).await {
                Ok(()) => report.purged_logs += 1,
                Err(e) => warn!("Failed to purge orphaned log {}: {:#}", log_key, e),
            }
        }
        report.orphaned_logs.push(log_key);
    }

    if report.loaded > 0 || !report.orphaned_logs.is_empty() {
        info!(
            "Reloaded {} disconnected sessions ({} invalid, {} orphaned logs)",
            report.loaded,
            report.skipped_invalid,
            report.orphaned_logs.len()
        );
    }

    report
}

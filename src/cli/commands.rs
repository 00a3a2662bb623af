//! Execution of administrative commands against a [`SuspensionCoordinator`].
//!
//! `false`/`None` from the coordinator means "not found or wrong state" and maps
//! to [`AdminOutcome::NotFound`]. Anything else that goes wrong is an error.

use super::args::AdminCommand;
use crate::suspend::{SessionRecord, SessionStatus, SuspendConfig, SuspensionCoordinator};
use anyhow::{Context, Result};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

/// Result of an administrative command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminOutcome {
    Completed,
    NotFound,
}

impl AdminOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            AdminOutcome::Completed => 0,
            AdminOutcome::NotFound => 1,
        }
    }
}

/// Exit code for unexpected failures
pub const FAILURE_EXIT_CODE: i32 = 2;

/// Storage settings for a coordinator opened by the admin commands.
///
/// A gateway may be running against the same directory, and its hanging
/// sessions have logs without sidecars, so orphan purging is always off here.
pub fn admin_suspend_config(mut config: SuspendConfig) -> SuspendConfig {
    if config.purge_orphaned_logs {
        info!("Ignoring purge_orphaned_logs for admin commands");
        config.purge_orphaned_logs = false;
    }
    config
}

pub async fn execute<W: Write>(
    coordinator: &SuspensionCoordinator,
    command: &AdminCommand,
    out: &mut W,
) -> Result<AdminOutcome> {
    match command {
        AdminCommand::List { user, json } => {
            let records = coordinator.list_sessions(user).await;
            if *json {
                serde_json::to_writer_pretty(&mut *out, &records)
                    .context("Failed to serialize session list")?;
                writeln!(out)?;
            } else if records.is_empty() {
                writeln!(out, "No suspended sessions for {}", user)?;
            } else {
                for record in &records {
                    writeln!(out, "{}", format_record(record))?;
                }
            }
            Ok(AdminOutcome::Completed)
        }
        AdminCommand::Export { user, id, output } => {
            let Some(export) = coordinator.get_log_content(user, id).await else {
                writeln!(out, "Session {} not found", id)?;
                return Ok(AdminOutcome::NotFound);
            };

            let destination = output
                .clone()
                .unwrap_or_else(|| PathBuf::from(&export.filename));
            tokio::fs::write(&destination, &export.content)
                .await
                .with_context(|| format!("Failed to write export to {}", destination.display()))?;

            info!("Exported session {} to {}", id, destination.display());
            writeln!(
                out,
                "Wrote {} bytes to {}",
                export.content.len(),
                destination.display()
            )?;
            Ok(AdminOutcome::Completed)
        }
        AdminCommand::Remove { user, id } => {
            report(
                out,
                coordinator.remove_disconnected_entry(user, id).await,
                format!("Removed session {}", id),
                format!("Session {} not found or still hanging", id),
            )
        }
        AdminCommand::Terminate { user, id } => report(
            out,
            coordinator.terminate(user, id).await,
            format!("Terminated session {}", id),
            format!("Session {} not found", id),
        ),
        AdminCommand::Rename { user, id, name } => report(
            out,
            coordinator.edit_name(user, id, name).await,
            format!("Renamed session {}", id),
            format!("Session {} not found", id),
        ),
    }
}

fn report<W: Write>(
    out: &mut W,
    succeeded: bool,
    success: String,
    failure: String,
) -> Result<AdminOutcome> {
    if succeeded {
        writeln!(out, "{}", success)?;
        Ok(AdminOutcome::Completed)
    } else {
        writeln!(out, "{}", failure)?;
        Ok(AdminOutcome::NotFound)
    }
}

fn format_record(record: &SessionRecord) -> String {
    let status = match record.status {
        SessionStatus::Hanging => "hanging",
        SessionStatus::Disconnected => "disconnected",
    };
    let since = record
        .disconnection_time
        .unwrap_or(record.suspend_start_time)
        .format("%Y-%m-%d %H:%M:%S UTC");
    format!(
        "{}  {:<12}  {}  ({})  since {}",
        record.suspend_id,
        status,
        record.display_name(),
        record.connection_id,
        since
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suspend::SuspendId;
    use chrono::Utc;
    use tempfile::TempDir;

    async fn coordinator_with_disconnected(dir: &TempDir, owner: &str) -> (SuspensionCoordinator, SuspendId) {
        let config = SuspendConfig::with_data_dir(dir.path().join("store"));
        let record = SessionRecord {
            suspend_id: SuspendId::new_v4(),
            log_key: "term-1".to_string(),
            owner_user_id: owner.to_string(),
            connection_name: "db primary".to_string(),
            connection_id: "conn-7".to_string(),
            original_session_id: "term-1".to_string(),
            status: SessionStatus::Disconnected,
            suspend_start_time: Utc::now(),
            disconnection_time: Some(Utc::now()),
            custom_name: None,
        };

        let store = crate::suspend::LogStore::new(config.data_dir.clone(), config.max_log_bytes);
        store.ensure_directory().await;
        store.write_metadata(&record).await.unwrap();
        store.append("term-1", b"$ uptime\n").await.unwrap();

        (SuspensionCoordinator::new(config).await, record.suspend_id)
    }

    #[tokio::test]
    async fn test_admin_config_keeps_unreferenced_logs() {
        let dir = TempDir::new().unwrap();
        let mut config = SuspendConfig::with_data_dir(dir.path().to_path_buf());
        config.purge_orphaned_logs = true;

        let store = crate::suspend::LogStore::new(config.data_dir.clone(), config.max_log_bytes);
        store.ensure_directory().await;
        store.append("live-elsewhere", b"$ top\n").await.unwrap();

        let admin_config = admin_suspend_config(config);
        assert!(!admin_config.purge_orphaned_logs);

        let coordinator = SuspensionCoordinator::new(admin_config).await;
        let report = coordinator.reload_persisted().await;

        assert_eq!(report.orphaned_logs, vec!["live-elsewhere".to_string()]);
        assert_eq!(report.purged_logs, 0);
        assert_eq!(store.read("live-elsewhere").await.unwrap(), b"$ top\n");
    }

    #[tokio::test]
    async fn test_list_prints_reloaded_sessions() {
        let dir = TempDir::new().unwrap();
        let (coordinator, id) = coordinator_with_disconnected(&dir, "alice").await;

        let mut out = Vec::new();
        let outcome = execute(
            &coordinator,
            &AdminCommand::List {
                user: "alice".to_string(),
                json: false,
            },
            &mut out,
        )
        .await
        .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(outcome, AdminOutcome::Completed);
        assert!(text.contains(&id.to_string()));
        assert!(text.contains("disconnected"));
        assert!(text.contains("db primary"));
    }

    #[tokio::test]
    async fn test_export_writes_log_file() {
        let dir = TempDir::new().unwrap();
        let (coordinator, id) = coordinator_with_disconnected(&dir, "alice").await;
        let destination = dir.path().join("export.log");

        let outcome = execute(
            &coordinator,
            &AdminCommand::Export {
                user: "alice".to_string(),
                id,
                output: Some(destination.clone()),
            },
            &mut Vec::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, AdminOutcome::Completed);
        assert_eq!(std::fs::read(&destination).unwrap(), b"$ uptime\n");
    }

    #[tokio::test]
    async fn test_wrong_owner_maps_to_not_found() {
        let dir = TempDir::new().unwrap();
        let (coordinator, id) = coordinator_with_disconnected(&dir, "alice").await;

        let outcome = execute(
            &coordinator,
            &AdminCommand::Remove {
                user: "mallory".to_string(),
                id,
            },
            &mut Vec::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, AdminOutcome::NotFound);
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(coordinator.list_sessions("alice").await.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_then_list_is_empty() {
        let dir = TempDir::new().unwrap();
        let (coordinator, id) = coordinator_with_disconnected(&dir, "alice").await;

        let outcome = execute(
            &coordinator,
            &AdminCommand::Remove {
                user: "alice".to_string(),
                id,
            },
            &mut Vec::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, AdminOutcome::Completed);
        assert!(coordinator.list_sessions("alice").await.is_empty());
    }
}

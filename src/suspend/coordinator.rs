use crate::env;
use crate::shell::{ChannelEvent, ClientEvent, ShellHandles};
use crate::suspend::log_store::LogStore;
use crate::suspend::metadata::*;
use crate::suspend::recovery::{self, RecoveryOptions, RecoveryReport};
use crate::suspend::registry::SessionRegistry;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use tokio::sync::{Mutex, broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_-]+").expect("valid filename pattern"));

/// Configuration for the suspension subsystem
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuspendConfig {
    /// Directory holding session logs and sidecar records
    pub data_dir: PathBuf,
    /// Size at which a session log restarts from empty
    pub max_log_bytes: u64,
    /// Capacity of the auto-termination notification channel
    pub notification_capacity: usize,
    /// Delete logs no record refers to when reloading at startup.
    ///
    /// Hanging sessions have a log but no sidecar, so a second process opening
    /// the same directory with this set deletes the logs of another process's
    /// live sessions. The admin commands always run with it off.
    pub purge_orphaned_logs: bool,
}

impl Default for SuspendConfig {
    fn default() -> Self {
        Self {
            data_dir: env::suspended_dir_path(std::path::Path::new(".")),
            max_log_bytes: env::suspend::DEFAULT_MAX_LOG_BYTES,
            notification_capacity: env::suspend::DEFAULT_NOTIFICATION_CAPACITY,
            purge_orphaned_logs: false,
        }
    }
}

impl SuspendConfig {
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Default::default()
        }
    }
}

/// Owns suspended SSH sessions between transport loss and resume.
///
/// A session enters through [`take_over`](Self::take_over) as a live entry
/// whose output is buffered to the [`LogStore`]. It leaves by being resumed,
/// terminated or removed. The only state change in between is live to
/// detached, fired once by whichever liveness signal arrives first.
///
/// Cloning is cheap; clones share the same registry.
#[derive(Clone)]
pub struct SuspensionCoordinator {
    registry: Arc<Mutex<SessionRegistry>>,
    log_store: Arc<LogStore>,
    notifications: broadcast::Sender<SessionAutoTerminated>,
    /// Orders sidecar writes so the last one on disk carries the latest record
    metadata_writes: Arc<Mutex<()>>,
    config: Arc<SuspendConfig>,
}

impl SuspensionCoordinator {
    /// Create a coordinator and reload every disconnected session persisted on disk.
    pub async fn new(config: SuspendConfig) -> Self {
        let log_store = LogStore::new(config.data_dir.clone(), config.max_log_bytes);
        log_store.ensure_directory().await;

        let (notifications, _) = broadcast::channel(config.notification_capacity.max(1));

        let coordinator = Self {
            registry: Arc::new(Mutex::new(SessionRegistry::new())),
            log_store: Arc::new(log_store),
            notifications,
            metadata_writes: Arc::new(Mutex::new(())),
            config: Arc::new(config),
        };

        coordinator.reload_persisted().await;
        coordinator
    }

    pub fn config(&self) -> &SuspendConfig {
        &self.config
    }

    pub fn log_store(&self) -> &LogStore {
        &self.log_store
    }

    /// Stream of auto-termination notifications for fan-out to live transports.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionAutoTerminated> {
        self.notifications.subscribe()
    }

    /// Register detached entries for sidecars on disk that are not yet known.
    pub async fn reload_persisted(&self) -> RecoveryReport {
        let options = RecoveryOptions {
            purge_orphaned_logs: self.config.purge_orphaned_logs,
        };
        let mut registry = self.registry.lock().await;
        recovery::reload_persisted(&self.log_store, &mut registry, &options).await
    }

    /// Take ownership of a live shell whose transport just went away.
    ///
    /// Returns `None` when the channel is no longer readable and writable, or
    /// when the log key is empty; the handles are then closed and nothing is
    /// recorded.
    pub async fn take_over(&self, request: TakeoverRequest) -> Option<SuspendId> {
        let TakeoverRequest {
            owner_user_id,
            original_session_id,
            handles,
            connection_name,
            connection_id,
            log_key,
            custom_name,
        } = request;

        if !handles.is_usable() {
            info!(
                "Shell of session {} is no longer usable, nothing to suspend",
                original_session_id
            );
            close_quietly(handles).await;
            return None;
        }

        if !LogStore::is_valid_key(&log_key) {
            warn!(
                "Refusing to suspend session {} with an empty log key",
                original_session_id
            );
            close_quietly(handles).await;
            return None;
        }

        // Replaces whatever listener the previous owner installed.
        let channel_events = handles.channel.subscribe();
        let client_events = handles.client.subscribe();

        if let Err(e) = self.log_store.touch(&log_key).await {
            warn!("Failed to create log {}: {:#}", log_key, e);
        }

        let mut registry = self.registry.lock().await;

        let mut suspend_id = SuspendId::new_v4();
        while registry.contains(&suspend_id) {
            suspend_id = SuspendId::new_v4();
        }

        let owner = owner_user_id.clone();
        let record = SessionRecord {
            suspend_id,
            log_key: log_key.clone(),
            owner_user_id,
            connection_name,
            connection_id,
            original_session_id,
            status: SessionStatus::Hanging,
            suspend_start_time: Utc::now(),
            disconnection_time: None,
            custom_name: normalize_name(custom_name.as_deref()),
        };

        // The pump blocks on the registry lock until the entry is inserted.
        let (drain, drain_signal) = oneshot::channel();
        let pump = tokio::spawn(self.clone().pump_events(
            suspend_id,
            log_key,
            channel_events,
            client_events,
            drain_signal,
        ));
        let pump_abort = pump.abort_handle();

        let session = SuspendedSession::Live {
            record,
            shell: LiveShell {
                handles,
                pump,
                drain,
            },
        };
        if let Err(e) = registry.insert(session) {
            error!("Failed to register suspended session: {}", e);
            pump_abort.abort();
            return None;
        }

        info!("Suspended session {} for user {}", suspend_id, owner);
        Some(suspend_id)
    }

    /// Hand a live session back to a new consumer together with its buffered output.
    ///
    /// Consumes the entry: a second call with the same id finds nothing.
    pub async fn resume(&self, owner_user_id: &str, suspend_id: &SuspendId) -> Option<ResumedSession> {
        let buffered = self.read_resumable(owner_user_id, suspend_id).await?;
        self.claim_resumable(owner_user_id, suspend_id, buffered).await
    }

    /// First half of resume: the entry must be live and its log readable.
    ///
    /// Nothing is changed, so a failed read leaves the session as it was.
    pub(crate) async fn read_resumable(
        &self,
        owner_user_id: &str,
        suspend_id: &SuspendId,
    ) -> Option<Vec<u8>> {
        let log_key = {
            let registry = self.registry.lock().await;
            match registry.get(owner_user_id, suspend_id) {
                Some(SuspendedSession::Live { record, .. }) => record.log_key.clone(),
                Some(SuspendedSession::Detached { .. }) => {
                    info!("Session {} is disconnected and cannot be resumed", suspend_id);
                    return None;
                }
                None => {
                    debug!("No suspended session {} for {}", suspend_id, owner_user_id);
                    return None;
                }
            }
        };

        match self.log_store.read(&log_key).await {
            Ok(buffered) => Some(buffered),
            Err(e) => {
                error!("Failed to read log of session {}: {:#}", suspend_id, e);
                None
            }
        }
    }

    /// Second half of resume: take the entry out if it is still live, flush
    /// the pump and hand everything back.
    pub(crate) async fn claim_resumable(
        &self,
        owner_user_id: &str,
        suspend_id: &SuspendId,
        buffered: Vec<u8>,
    ) -> Option<ResumedSession> {
        let (record, shell) = {
            let mut registry = self.registry.lock().await;
            if !registry
                .get(owner_user_id, suspend_id)
                .is_some_and(SuspendedSession::is_live)
            {
                debug!("Session {} was resumed or lost meanwhile", suspend_id);
                return None;
            }
            match registry.remove(owner_user_id, suspend_id) {
                Some(SuspendedSession::Live { record, shell }) => (record, shell),
                _ => return None,
            }
        };

        let handles = shell.release().await;

        let log_data = match self.log_store.read(&record.log_key).await {
            Ok(log_data) => log_data,
            Err(e) => {
                warn!(
                    "Re-reading log of session {} failed, returning the earlier read: {:#}",
                    suspend_id, e
                );
                buffered
            }
        };

        if let Err(e) = self.log_store.delete(&record.log_key).await {
            warn!("Failed to delete log of resumed session {}: {:#}", suspend_id, e);
        }

        info!("Resumed session {} ({} bytes buffered)", suspend_id, log_data.len());

        Some(ResumedSession {
            handles,
            log_data,
            connection_name: record.connection_name,
            connection_id: record.connection_id,
        })
    }

    /// Destroy a session in either state, closing live handles and deleting its files.
    pub async fn terminate(&self, owner_user_id: &str, suspend_id: &SuspendId) -> bool {
        let removed = {
            let mut registry = self.registry.lock().await;
            registry.remove(owner_user_id, suspend_id)
        };

        let Some(session) = removed else {
            debug!("No suspended session {} to terminate", suspend_id);
            return false;
        };

        let record = match session {
            SuspendedSession::Live { record, shell } => {
                let handles = shell.abort().await;
                if let Err(e) = handles.channel.close().await {
                    warn!("Failed to close channel of session {}: {}", suspend_id, e);
                }
                if let Err(e) = handles.client.close().await {
                    warn!("Failed to close client of session {}: {}", suspend_id, e);
                }
                record
            }
            SuspendedSession::Detached { record } => record,
        };

        self.discard_storage(&record).await;
        info!("Terminated suspended session {}", suspend_id);
        true
    }

    /// Remove a disconnected entry and its files.
    ///
    /// Refuses live entries so an open remote shell is never orphaned. Files
    /// whose record is no longer in memory are still cleaned up.
    pub async fn remove_disconnected_entry(&self, owner_user_id: &str, suspend_id: &SuspendId) -> bool {
        let removed = {
            let mut registry = self.registry.lock().await;
            match registry.get(owner_user_id, suspend_id) {
                Some(SuspendedSession::Live { .. }) => {
                    info!(
                        "Session {} is still hanging; terminate it instead",
                        suspend_id
                    );
                    return false;
                }
                Some(SuspendedSession::Detached { .. }) => {
                    registry.remove(owner_user_id, suspend_id)
                }
                None => None,
            }
        };

        let record = match removed {
            Some(session) => session.into_record(),
            None => match self.log_store.read_metadata(&suspend_id.to_string()).await {
                Ok(Some(record)) if record.owner_user_id == owner_user_id => record,
                Ok(_) => return false,
                Err(e) => {
                    warn!("Failed to read metadata of {}: {:#}", suspend_id, e);
                    return false;
                }
            },
        };

        self.discard_storage(&record).await;
        info!("Removed disconnected session {}", suspend_id);
        true
    }

    /// Set or clear the user-facing label of a session.
    pub async fn edit_name(&self, owner_user_id: &str, suspend_id: &SuspendId, new_name: &str) -> bool {
        let detached = {
            let mut registry = self.registry.lock().await;
            let Some(session) = registry.get_mut(owner_user_id, suspend_id) else {
                return false;
            };
            session.record_mut().custom_name = normalize_name(Some(new_name));
            !session.is_live()
        };

        if detached {
            self.persist_detached(suspend_id).await;
        }
        true
    }

    /// Read a session's buffered output for download without consuming it.
    pub async fn get_log_content(&self, owner_user_id: &str, suspend_id: &SuspendId) -> Option<LogExport> {
        let (log_key, label) = {
            let registry = self.registry.lock().await;
            let record = registry.get(owner_user_id, suspend_id)?.record();
            (record.log_key.clone(), record.display_name().to_string())
        };

        match self.log_store.read(&log_key).await {
            Ok(content) => Some(LogExport {
                content,
                filename: export_filename(&label, Utc::now()),
            }),
            Err(e) => {
                error!("Failed to export log of session {}: {:#}", suspend_id, e);
                None
            }
        }
    }

    /// Mark a session disconnected because the caller learned its transport died.
    ///
    /// Returns whether this call performed the transition.
    pub async fn handle_unexpected_disconnection(&self, owner_user_id: &str, suspend_id: &SuspendId) -> bool {
        {
            let registry = self.registry.lock().await;
            if registry.get(owner_user_id, suspend_id).is_none() {
                return false;
            }
        }
        self.mark_disconnected(suspend_id, "Connection lost unexpectedly", false)
            .await
    }

    /// Records owned by a user, oldest first.
    pub async fn list_sessions(&self, owner_user_id: &str) -> Vec<SessionRecord> {
        self.registry.lock().await.list(owner_user_id)
    }

    /// Status of a single session, if the user owns it.
    pub async fn session_status(&self, owner_user_id: &str, suspend_id: &SuspendId) -> Option<SessionStatus> {
        let registry = self.registry.lock().await;
        registry.get(owner_user_id, suspend_id).map(SuspendedSession::status)
    }

    /// Funnel handle events: buffer data, and turn the first liveness signal
    /// into a single transition.
    async fn pump_events(
        self,
        suspend_id: SuspendId,
        log_key: String,
        mut channel_events: mpsc::UnboundedReceiver<ChannelEvent>,
        mut client_events: mpsc::UnboundedReceiver<ClientEvent>,
        mut drain_signal: oneshot::Receiver<()>,
    ) {
        let reason = loop {
            tokio::select! {
                biased;
                _ = &mut drain_signal => {
                    self.drain_output(&suspend_id, &log_key, &mut channel_events).await;
                    return;
                }
                event = channel_events.recv() => match event {
                    Some(ChannelEvent::Data(chunk)) => {
                        self.buffer_output(&suspend_id, &log_key, &chunk).await;
                    }
                    Some(event) => {
                        break event
                            .disconnect_reason()
                            .unwrap_or_else(|| "SSH channel closed".to_string());
                    }
                    None => break "SSH channel stopped reporting events".to_string(),
                },
                event = client_events.recv() => match event {
                    Some(event) => break event.disconnect_reason(),
                    None => break "SSH connection stopped reporting events".to_string(),
                },
            }
        };

        self.mark_disconnected(&suspend_id, &reason, true).await;
    }

    async fn buffer_output(&self, suspend_id: &SuspendId, log_key: &str, chunk: &[u8]) {
        // An absent entry is being resumed and still wants its output.
        let disconnected = {
            let registry = self.registry.lock().await;
            registry
                .get_any(suspend_id)
                .is_some_and(|session| session.status() == SessionStatus::Disconnected)
        };
        if disconnected {
            debug!("Dropping {} bytes for disconnected session {}", chunk.len(), suspend_id);
            return;
        }

        if let Err(e) = self.log_store.append(log_key, chunk).await {
            warn!("Failed to buffer output of session {}: {:#}", suspend_id, e);
        }
    }

    /// Append every output chunk still queued, until the listener is gone.
    async fn drain_output(
        &self,
        suspend_id: &SuspendId,
        log_key: &str,
        channel_events: &mut mpsc::UnboundedReceiver<ChannelEvent>,
    ) {
        let mut drained = 0;
        while let Some(event) = channel_events.recv().await {
            if let ChannelEvent::Data(chunk) = event {
                drained += chunk.len();
                if let Err(e) = self.log_store.append(log_key, &chunk).await {
                    warn!("Failed to buffer output of session {}: {:#}", suspend_id, e);
                }
            }
        }
        debug!("Flushed {} queued bytes of session {}", drained, suspend_id);
    }

    /// The single hanging-to-disconnected transition.
    ///
    /// Only the first caller for a live entry gets past the registry check, so
    /// exactly one notification is published per session.
    async fn mark_disconnected(&self, suspend_id: &SuspendId, reason: &str, from_pump: bool) -> bool {
        let transitioned = {
            let mut registry = self.registry.lock().await;
            let mut transitioned = None;
            registry.replace_with(suspend_id, |session| match session {
                SuspendedSession::Live { mut record, shell } => {
                    record.mark_disconnected();
                    transitioned = Some((record.clone(), shell));
                    SuspendedSession::Detached { record }
                }
                detached => detached,
            });
            transitioned
        };

        let Some((record, shell)) = transitioned else {
            return false;
        };

        // A pump cannot wait for itself.
        let handles = if from_pump {
            let LiveShell { handles, .. } = shell;
            handles.detach_listeners();
            handles
        } else {
            shell.abort().await
        };
        drop(handles);

        info!("Suspended session {} disconnected: {}", suspend_id, reason);

        self.persist_detached(suspend_id).await;

        let notification = SessionAutoTerminated {
            owner_user_id: record.owner_user_id.clone(),
            suspend_id: *suspend_id,
            reason: reason.to_string(),
        };
        if self.notifications.send(notification).is_err() {
            debug!("No subscribers for termination of {}", suspend_id);
        }
        true
    }

    /// Best-effort sidecar write of the current state of a detached record.
    ///
    /// The record is read under the write lock, so writes land in the order
    /// their snapshots were taken.
    async fn persist_detached(&self, suspend_id: &SuspendId) {
        let _write = self.metadata_writes.lock().await;

        let record = {
            let registry = self.registry.lock().await;
            match registry.get_any(suspend_id) {
                Some(SuspendedSession::Detached { record }) => record.clone(),
                _ => {
                    debug!("Session {} is gone, skipping metadata write", suspend_id);
                    return;
                }
            }
        };

        if let Err(e) = self.log_store.write_metadata(&record).await {
            error!(
                "Failed to persist metadata of session {}: {:#}",
                suspend_id, e
            );
        }
    }

    async fn discard_storage(&self, record: &SessionRecord) {
        if let Err(e) = self.log_store.delete(&record.log_key).await {
            warn!("Failed to delete log of session {}: {:#}", record.suspend_id, e);
        }

        // Waits out a write that snapshotted the record before it was removed.
        let _write = self.metadata_writes.lock().await;
        if let Err(e) = self
            .log_store
            .delete_metadata(&record.suspend_id.to_string())
            .await
        {
            warn!(
                "Failed to delete metadata of session {}: {:#}",
                record.suspend_id, e
            );
        }
    }
}

async fn close_quietly(handles: ShellHandles) {
    if let Err(e) = handles.channel.close().await {
        debug!("Ignoring channel close error: {}", e);
    }
    if let Err(e) = handles.client.close().await {
        debug!("Ignoring client close error: {}", e);
    }
}

fn normalize_name(name: Option<&str>) -> Option<String> {
    name.map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// Download name for an exported log: sanitized label plus timestamp.
pub fn export_filename(label: &str, at: DateTime<Utc>) -> String {
    let sanitized = UNSAFE_FILENAME_CHARS.replace_all(label.trim(), "_");
    let sanitized = sanitized.trim_matches('_');
    let stem = if sanitized.is_empty() {
        "session"
    } else {
        sanitized
    };
    format!("{}_{}.log", stem, at.format("%Y-%m-%dT%H-%M-%S"))
}

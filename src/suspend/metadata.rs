use crate::shell::ShellHandles;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Unique suspended-session identifier
pub type SuspendId = uuid::Uuid;

/// Lifecycle state of a suspended session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Transport believed alive, no browser attached
    Hanging,
    /// Transport gone; only the record and its log remain
    Disconnected,
}

/// Non-handle fields of a suspended session.
///
/// Also the on-disk sidecar format written once a session becomes
/// [`SessionStatus::Disconnected`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub suspend_id: SuspendId,
    /// Storage identity of the buffered output
    pub log_key: String,
    pub owner_user_id: String,
    pub connection_name: String,
    pub connection_id: String,
    pub original_session_id: String,
    pub status: SessionStatus,
    pub suspend_start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disconnection_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_name: Option<String>,
}

impl SessionRecord {
    /// Required string fields must be present and non-blank.
    pub fn is_well_formed(&self) -> bool {
        [
            &self.log_key,
            &self.owner_user_id,
            &self.connection_name,
            &self.connection_id,
            &self.original_session_id,
        ]
        .iter()
        .all(|field| !field.trim().is_empty())
    }

    /// Label shown to the user: the custom name if set, else the connection name.
    pub fn display_name(&self) -> &str {
        self.custom_name
            .as_deref()
            .unwrap_or(self.connection_name.as_str())
    }

    pub(crate) fn mark_disconnected(&mut self) {
        self.status = SessionStatus::Disconnected;
        self.disconnection_time = Some(Utc::now());
    }
}

/// Live handles owned by the coordinator together with the task that reacts to them
pub struct LiveShell {
    pub(crate) handles: ShellHandles,
    pub(crate) pump: JoinHandle<()>,
    /// Switches the pump to flushing queued output and exiting
    pub(crate) drain: oneshot::Sender<()>,
}

impl LiveShell {
    /// Hand the handles back once every event already delivered has been buffered.
    ///
    /// Detaching drops the pump's senders, so its queue ends after the last
    /// pending event.
    pub(crate) async fn release(self) -> ShellHandles {
        let LiveShell {
            handles,
            pump,
            drain,
        } = self;
        handles.detach_listeners();
        let _ = drain.send(());
        let _ = pump.await;
        handles
    }

    /// Stop reacting immediately; anything still queued is discarded.
    pub(crate) async fn abort(self) -> ShellHandles {
        self.pump.abort();
        let _ = self.pump.await;
        self.handles.detach_listeners();
        self.handles
    }
}

/// A registry entry.
///
/// Only `Live` entries own SSH handles. A session that lost its transport, or
/// one reloaded from disk after a restart, is `Detached` and can be listed,
/// exported, renamed or removed but never resumed.
pub enum SuspendedSession {
    Live { record: SessionRecord, shell: LiveShell },
    Detached { record: SessionRecord },
}

impl SuspendedSession {
    pub fn record(&self) -> &SessionRecord {
        match self {
            SuspendedSession::Live { record, .. } | SuspendedSession::Detached { record } => record,
        }
    }

    pub fn record_mut(&mut self) -> &mut SessionRecord {
        match self {
            SuspendedSession::Live { record, .. } | SuspendedSession::Detached { record } => record,
        }
    }

    pub fn into_record(self) -> SessionRecord {
        match self {
            SuspendedSession::Live { record, .. } | SuspendedSession::Detached { record } => record,
        }
    }

    pub fn suspend_id(&self) -> SuspendId {
        self.record().suspend_id
    }

    pub fn owner_user_id(&self) -> &str {
        &self.record().owner_user_id
    }

    pub fn status(&self) -> SessionStatus {
        self.record().status
    }

    pub fn is_live(&self) -> bool {
        matches!(self, SuspendedSession::Live { .. })
    }
}

impl std::fmt::Debug for SuspendedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuspendedSession::Live { record, .. } => {
                f.debug_struct("Live").field("record", record).finish()
            }
            SuspendedSession::Detached { record } => {
                f.debug_struct("Detached").field("record", record).finish()
            }
        }
    }
}

/// Everything a caller needs to reattach a resumed session
#[derive(Debug)]
pub struct ResumedSession {
    /// Handles with no listener installed
    pub handles: ShellHandles,
    /// Output buffered while suspended, to replay before live data
    pub log_data: Vec<u8>,
    pub connection_name: String,
    pub connection_id: String,
}

/// A session log prepared for download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogExport {
    pub content: Vec<u8>,
    pub filename: String,
}

/// Published once per session when its transport is found dead
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionAutoTerminated {
    pub owner_user_id: String,
    pub suspend_id: SuspendId,
    pub reason: String,
}

/// Parameters of a takeover request
#[derive(Debug)]
pub struct TakeoverRequest {
    pub owner_user_id: String,
    pub original_session_id: String,
    pub handles: ShellHandles,
    pub connection_name: String,
    pub connection_id: String,
    pub log_key: String,
    pub custom_name: Option<String>,
}

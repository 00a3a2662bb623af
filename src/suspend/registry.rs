use crate::suspend::metadata::{SessionRecord, SuspendId, SuspendedSession};
use std::collections::{BTreeSet, HashMap};

/// Registry errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Suspend id already registered: {0}")]
    DuplicateId(SuspendId),
}

/// In-memory table of suspended sessions.
///
/// One flat table keyed by suspend id, plus a per-owner index. Every id lives
/// in the table at most once and therefore belongs to exactly one owner.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SuspendId, SuspendedSession>,
    by_owner: HashMap<String, BTreeSet<SuspendId>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, session: SuspendedSession) -> Result<(), RegistryError> {
        let suspend_id = session.suspend_id();
        if self.sessions.contains_key(&suspend_id) {
            return Err(RegistryError::DuplicateId(suspend_id));
        }

        self.by_owner
            .entry(session.owner_user_id().to_string())
            .or_default()
            .insert(suspend_id);
        self.sessions.insert(suspend_id, session);
        Ok(())
    }

    /// Look up an entry only if it belongs to `owner`.
    pub fn get(&self, owner: &str, suspend_id: &SuspendId) -> Option<&SuspendedSession> {
        self.sessions
            .get(suspend_id)
            .filter(|session| session.owner_user_id() == owner)
    }

    pub fn get_mut(&mut self, owner: &str, suspend_id: &SuspendId) -> Option<&mut SuspendedSession> {
        self.sessions
            .get_mut(suspend_id)
            .filter(|session| session.owner_user_id() == owner)
    }

    /// Look up an entry regardless of owner.
    pub fn get_any(&self, suspend_id: &SuspendId) -> Option<&SuspendedSession> {
        self.sessions.get(suspend_id)
    }

    pub fn contains(&self, suspend_id: &SuspendId) -> bool {
        self.sessions.contains_key(suspend_id)
    }

    /// Remove an entry only if it belongs to `owner`.
    pub fn remove(&mut self, owner: &str, suspend_id: &SuspendId) -> Option<SuspendedSession> {
        self.get(owner, suspend_id)?;
        self.remove_any(suspend_id)
    }

    /// Replace an entry in place, keeping its id and owner.
    ///
    /// Used for the live-to-detached transition.
    pub fn replace_with<F>(&mut self, suspend_id: &SuspendId, f: F) -> bool
    where
        F: FnOnce(SuspendedSession) -> SuspendedSession,
    {
        let Some(session) = self.sessions.remove(suspend_id) else {
            return false;
        };
        let replaced = f(session);
        debug_assert_eq!(replaced.suspend_id(), *suspend_id);
        self.sessions.insert(*suspend_id, replaced);
        true
    }

    fn remove_any(&mut self, suspend_id: &SuspendId) -> Option<SuspendedSession> {
        let session = self.sessions.remove(suspend_id)?;
        let owner = session.owner_user_id().to_string();
        if let Some(ids) = self.by_owner.get_mut(&owner) {
            ids.remove(suspend_id);
            if ids.is_empty() {
                self.by_owner.remove(&owner);
            }
        }
        Some(session)
    }

    /// Snapshot of an owner's records, oldest suspension first.
    pub fn list(&self, owner: &str) -> Vec<SessionRecord> {
        let mut records: Vec<SessionRecord> = self
            .by_owner
            .get(owner)
            .into_iter()
            .flatten()
            .filter_map(|id| self.sessions.get(id))
            .map(|session| session.record().clone())
            .collect();
        records.sort_by_key(|record| record.suspend_start_time);
        records
    }

    /// Log keys referenced by any entry.
    pub fn log_keys(&self) -> BTreeSet<String> {
        self.sessions
            .values()
            .map(|session| session.record().log_key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

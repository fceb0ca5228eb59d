use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::models::chat::{Message, Role, SessionId};
use crate::utils::error::MemoryResult;

use super::session_log::Session;

/// Thread-safe in-memory session store
///
/// DashMap shards the id -> session index; each session carries its own
/// locks, so work on different sessions never serializes on a global lock.
/// Sessions live as long as the store does.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<SessionId, Arc<Session>>,
}

impl SessionStore {
    /// Create an empty store
    pub fn new() -> Self {
        info!("Initializing session store with DashMap");
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Existing session, or a freshly created empty one.
    /// Racing creators for the same id all observe the same session.
    pub fn get_or_create(&self, session_id: &str) -> MemoryResult<Arc<Session>> {
        let session_id = SessionId::parse(session_id)?;
        Ok(self.get_or_create_parsed(session_id))
    }

    pub(crate) fn get_or_create_parsed(&self, session_id: SessionId) -> Arc<Session> {
        if let Some(entry) = self.sessions.get(&session_id) {
            return entry.value().clone();
        }

        self.sessions
            .entry(session_id.clone())
            .or_insert_with(|| {
                debug!("Created session {}", session_id);
                Arc::new(Session::new(session_id))
            })
            .value()
            .clone()
    }

    /// Existing session only; never creates
    pub fn get(&self, session_id: &str) -> MemoryResult<Option<Arc<Session>>> {
        let session_id = SessionId::parse(session_id)?;
        Ok(self.sessions.get(&session_id).map(|e| e.value().clone()))
    }

    /// Append one message to a session, creating the session if needed
    pub fn append(
        &self,
        session_id: &str,
        role: Role,
        content: impl Into<String>,
    ) -> MemoryResult<Message> {
        let session = self.get_or_create(session_id)?;
        Ok(session.append(role, content))
    }

    /// Full history copy. Unknown sessions read as empty and are not created.
    pub fn snapshot(&self, session_id: &str) -> MemoryResult<Vec<Message>> {
        Ok(self
            .get(session_id)?
            .map(|session| session.snapshot())
            .unwrap_or_default())
    }

    /// Get number of active sessions
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Messages stored for one session (0 when unknown)
    pub fn message_count(&self, session_id: &str) -> MemoryResult<usize> {
        Ok(self.get(session_id)?.map(|s| s.len()).unwrap_or(0))
    }

    /// Messages stored across all sessions
    pub fn total_messages(&self) -> usize {
        self.sessions.iter().map(|entry| entry.value().len()).sum()
    }

    /// All session ids, sorted
    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::{Mutex, MutexGuard};

use crate::models::chat::{Message, Role, SessionId};

/// Append-only message log for one session
#[derive(Debug, Clone)]
pub struct SessionLog {
    session_id: SessionId,
    messages: Vec<Message>,
    next_sequence: u64,
}

impl SessionLog {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            messages: Vec::new(),
            next_sequence: 0,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Stamp the next sequence number and push. The only write path.
    fn append(&mut self, role: Role, content: String) -> Message {
        let message = Message::new(self.next_sequence, role, content);
        self.next_sequence += 1;
        self.messages.push(message.clone());
        message
    }
}

/// Per-session slot held by the store.
///
/// `log` guards short synchronous sections (append, copy). `turn_lock` is held
/// for the whole of a manager turn, including the generation await, so turns
/// on the same session run one after another.
#[derive(Debug)]
pub struct Session {
    log: RwLock<SessionLog>,
    turn_lock: Mutex<()>,
    created_at: DateTime<Utc>,
}

impl Session {
    pub(crate) fn new(session_id: SessionId) -> Self {
        Self {
            log: RwLock::new(SessionLog::new(session_id)),
            turn_lock: Mutex::new(()),
            created_at: Utc::now(),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.log.read().session_id().clone()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub(crate) fn append(&self, role: Role, content: impl Into<String>) -> Message {
        self.log.write().append(role, content.into())
    }

    /// Copy of the full log at call time
    pub fn snapshot(&self) -> Vec<Message> {
        self.log.read().messages().to_vec()
    }

    pub fn len(&self) -> usize {
        self.log.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.read().is_empty()
    }

    pub(crate) async fn lock_turn(&self) -> MutexGuard<'_, ()> {
        self.turn_lock.lock().await
    }
}

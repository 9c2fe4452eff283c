//! In-memory session store with write-through persistence.
//!
//! All state sits behind one mutex. Readers get owned copies, so nothing
//! outside the store can observe or corrupt a session mid-update. Writes to
//! durable storage are serialized separately, so the last snapshot taken is
//! always the last one written.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use pincer_types::error::StoreError;
use pincer_types::llm::{Message, Role};
use pincer_types::session::{Session, SessionInfo};
use tracing::{debug, info};

use super::box_persistence::BoxSessionPersistence;
use super::persistence::{NoopPersistence, SessionPersistence};

/// Per-key conversation history and rolling summary.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    persistence: BoxSessionPersistence,
    write_order: tokio::sync::Mutex<()>,
}

impl SessionStore {
    /// A store that never writes to disk.
    pub fn in_memory() -> Self {
        Self::new(NoopPersistence)
    }

    /// An empty store writing through `persistence`.
    pub fn new<P: SessionPersistence + 'static>(persistence: P) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            persistence: BoxSessionPersistence::new(persistence),
            write_order: tokio::sync::Mutex::new(()),
        }
    }

    /// Build a store and load every persisted session into memory.
    pub async fn load<P: SessionPersistence + 'static>(persistence: P) -> Result<Self, StoreError> {
        let store = Self::new(persistence);
        let loaded = store.persistence.load_all().await?;
        let count = loaded.len();
        {
            let mut sessions = store.lock();
            for session in loaded {
                sessions.insert(session.key.clone(), session);
            }
        }
        info!(count, "loaded persisted sessions");
        Ok(store)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_session<R>(&self, key: &str, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut sessions = self.lock();
        let session = sessions
            .entry(key.to_string())
            .or_insert_with(|| Session::new(key));
        f(session)
    }

    /// Snapshot of the session for `key`, creating it if absent.
    pub fn get_or_create(&self, key: &str) -> Session {
        self.with_session(key, |session| session.clone())
    }

    pub fn append(&self, key: &str, role: Role, content: impl Into<String>) {
        self.append_message(key, Message::new(role, content));
    }

    pub fn append_message(&self, key: &str, message: Message) {
        self.with_session(key, |session| session.push(message));
    }

    /// Copy of the message history for `key`.
    pub fn history(&self, key: &str) -> Vec<Message> {
        self.with_session(key, |session| session.messages.clone())
    }

    pub fn len(&self, key: &str) -> usize {
        self.lock().get(key).map_or(0, |session| session.messages.len())
    }

    pub fn summary(&self, key: &str) -> String {
        self.with_session(key, |session| session.summary.clone())
    }

    pub fn set_summary(&self, key: &str, summary: impl Into<String>) {
        let summary = summary.into();
        self.with_session(key, |session| {
            session.summary = summary;
            session.touch();
        });
    }

    /// Drop all but the last `keep_last` messages.
    pub fn truncate(&self, key: &str, keep_last: usize) {
        self.with_session(key, |session| {
            let len = session.messages.len();
            if len > keep_last {
                session.messages.drain(..len - keep_last);
                session.touch();
            }
        });
    }

    /// Replace the summary and remove the oldest `removed` messages in one
    /// step.
    ///
    /// Messages appended after the caller took its history snapshot survive,
    /// because only the counted prefix is removed.
    pub fn compact_prefix(&self, key: &str, removed: usize, summary: impl Into<String>) {
        let summary = summary.into();
        self.with_session(key, |session| {
            let removed = removed.min(session.messages.len());
            session.messages.drain(..removed);
            session.summary = summary;
            session.touch();
            debug!(session_key = %key, removed, remaining = session.messages.len(), "compacted session");
        });
    }

    /// Write the session for `key` to durable storage.
    ///
    /// The snapshot is taken under the session lock and written outside it.
    /// Concurrent calls queue on a write lock held across snapshot and save,
    /// so an older snapshot never lands after a newer one.
    pub async fn persist(&self, key: &str) -> Result<(), StoreError> {
        let _writing = self.write_order.lock().await;
        let snapshot = self
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        self.persistence.save(&snapshot).await
    }

    /// Listing of every session, most recently updated first.
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self.lock().values().map(SessionInfo::from).collect();
        infos.sort_by(|a, b| b.updated.cmp(&a.updated));
        infos
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.lock().len())
            .finish()
    }
}

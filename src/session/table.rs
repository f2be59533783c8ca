//! Session table
//!
//! Owns every live protocol engine keyed by its session identifier. Engines
//! only hold a [`SessionCloseHook`], a weak handle used to drop their own
//! entry when they close.

use std::{
    borrow::Borrow,
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, Weak},
};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::mcp::engine::ProtocolEngine;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(Arc<str>);

impl SessionId {
    /// Random v4 UUID drawn from the OS CSPRNG.
    pub fn generate() -> Self {
        Self(Arc::from(Uuid::new_v4().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

impl Borrow<str> for SessionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone)]
pub struct Session {
    pub id: SessionId,
    pub engine: Arc<ProtocolEngine>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Time elapsed since the handshake registered this session.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.created_at
    }
}

type SessionMap = HashMap<SessionId, Session>;

#[derive(Clone, Default)]
pub struct SessionTable {
    sessions: Arc<Mutex<SessionMap>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        self.lock().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Inserts a freshly initialized session. Returns `false` without
    /// touching the table when the identifier is already taken or the engine
    /// closed before registration.
    pub fn register(&self, id: SessionId, engine: Arc<ProtocolEngine>) -> bool {
        let mut sessions = self.lock();
        if sessions.contains_key(&id) || engine.is_closed() {
            return false;
        }

        sessions.insert(
            id.clone(),
            Session {
                id,
                engine,
                created_at: Utc::now(),
            },
        );
        true
    }

    pub fn close_hook(&self) -> SessionCloseHook {
        SessionCloseHook {
            sessions: Arc::downgrade(&self.sessions),
        }
    }

    fn remove(sessions: &Mutex<SessionMap>, id: &SessionId) -> Option<Session> {
        sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(id)
    }

    fn lock(&self) -> MutexGuard<'_, SessionMap> {
        // No code path panics while holding the guard; recover rather than propagate.
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Non-owning back-reference from an engine to the table that holds it.
#[derive(Clone, Default)]
pub struct SessionCloseHook {
    sessions: Weak<Mutex<SessionMap>>,
}

impl SessionCloseHook {
    /// Hook attached to no table; closing only affects the engine.
    pub fn detached() -> Self {
        Self::default()
    }

    pub(crate) fn session_closed(&self, id: &SessionId) -> bool {
        self.sessions
            .upgrade()
            .and_then(|sessions| SessionTable::remove(&sessions, id))
            .is_some()
    }
}

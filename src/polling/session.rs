//! Session identifiers and the session registry.
//!
//! The registry is the only place where stateless HTTP requests are matched to
//! a live [`Connection`]. It sits behind one exclusive lock, held just for map
//! operations; nothing awaits while holding it.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::polling::connection::Connection;
use crate::polling::error::{TransportError, TransportResult};

/// Opaque token correlating HTTP requests to one logical connection.
///
/// Issued by whoever performs the handshake; this crate never generates one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl Borrow<str> for SessionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Mapping from session id to connection.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, Connection>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, Connection>> {
        // Map operations never panic midway, so a poisoned map is still consistent.
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `connection` under `id`.
    ///
    /// Binding the same connection to the same id again is a no-op. A taken id
    /// is never overwritten, a connection never answers to two ids, and a
    /// closed connection cannot be bound.
    pub fn bind(&self, id: SessionId, connection: &Connection) -> TransportResult<()> {
        let mut sessions = self.lock();

        if connection.is_closed() {
            return Err(TransportError::Closed);
        }

        match sessions.get(&id) {
            Some(existing) if existing.same_as(connection) => return Ok(()),
            Some(_) => return Err(TransportError::SessionAlreadyBound(id)),
            None => {}
        }

        connection.claim_session(&id)?;
        sessions.insert(id, connection.clone());
        Ok(())
    }

    /// Resolve a session id.
    pub fn get(&self, id: &str) -> Option<Connection> {
        self.lock().get(id).cloned()
    }

    /// Remove `connection` from the registry if it is still bound.
    ///
    /// The connection's own session id is read under the registry lock, which
    /// keeps this consistent with a concurrent [`bind`](Self::bind).
    pub fn release(&self, connection: &Connection) -> Option<SessionId> {
        let mut sessions = self.lock();
        let id = connection.session_id()?;

        match sessions.get(&id) {
            Some(existing) if existing.same_as(connection) => {
                sessions.remove(&id);
                Some(id)
            }
            _ => None,
        }
    }

    /// Snapshot of every bound connection.
    pub fn connections(&self) -> Vec<Connection> {
        self.lock().values().cloned().collect()
    }

    /// Number of bound sessions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

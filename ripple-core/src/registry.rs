//! Session Registry
//!
//! A host serving many users keeps one [`Session`] per connection. The
//! registry maps session ids to sessions behind their own locks, so events
//! for different users never contend and never observe each other's state.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::config::SessionConfig;
use crate::error::GraphError;
use crate::graph::Graph;
use crate::reactive::RenderSink;
use crate::session::Session;

/// Identifier of a session within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Concurrent map of live sessions over one graph.
pub struct SessionRegistry {
    graph: Graph,
    config: SessionConfig,
    sessions: DashMap<SessionId, Arc<Mutex<Session>>>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    /// Sessions opened by this registry all use `config`.
    pub fn new(graph: Graph, config: SessionConfig) -> Self {
        Self {
            graph,
            config,
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Open a session rendering to `sink`.
    pub fn open<S: RenderSink + 'static>(&self, sink: S) -> Result<SessionId, GraphError> {
        let session = self.graph.session(self.config.clone(), sink)?;
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.sessions.insert(id, Arc::new(Mutex::new(session)));
        debug!(session = %id, live = self.sessions.len(), "session opened");
        Ok(id)
    }

    /// Shared handle to a session.
    pub fn get(&self, id: SessionId) -> Option<Arc<Mutex<Session>>> {
        self.sessions.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Run `f` with exclusive access to a session.
    ///
    /// The registry's shard lock is released before `f` runs.
    pub fn with<R>(&self, id: SessionId, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let session = self.get(id)?;
        let mut guard = session.lock();
        Some(f(&mut guard))
    }

    /// Drop a session. Returns whether it existed.
    pub fn close(&self, id: SessionId) -> bool {
        let removed = self.sessions.remove(&id).is_some();
        if removed {
            debug!(session = %id, live = self.sessions.len(), "session closed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Ids of the live sessions, in no particular order.
    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("nodes", &self.graph.len())
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

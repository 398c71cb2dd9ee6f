//! In-process editor host: sessions, their documents, and their server connections.

pub mod document;
pub mod resolve;

pub use document::{file_uri, Document, DocumentHandle, INITIAL_VERSION};
pub use resolve::{resolve, ResolvedDocuments};

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::lsp::ServerConnection;

/// Identifier of a session, increasing in creation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Host lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Added(SessionId),
    Removed(SessionId),
}

/// Immutable view of one session at the time of the snapshot
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub path: PathBuf,
    pub document: Option<DocumentHandle>,
}

struct Session {
    path: PathBuf,
    document: watch::Sender<Option<DocumentHandle>>,
    connection: Option<Arc<ServerConnection>>,
}

#[derive(Default)]
struct Sessions {
    next_id: u64,
    by_id: BTreeMap<SessionId, Session>,
}

/// Registry of open editor sessions.
///
/// Readers get snapshots; nothing outside the registry holds its lock.
pub struct SessionRegistry {
    sessions: RwLock<Sessions>,
    events: broadcast::Sender<SessionEvent>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            sessions: RwLock::new(Sessions::default()),
            events,
        }
    }

    /// Subscribe to lifecycle events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Register a session whose document is not ready yet
    pub fn add_session(
        &self,
        path: impl Into<PathBuf>,
        connection: Option<Arc<ServerConnection>>,
    ) -> SessionId {
        let path = path.into();
        let id = {
            let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
            let id = SessionId(sessions.next_id);
            sessions.next_id += 1;
            let (document, _) = watch::channel(None);
            sessions.by_id.insert(
                id,
                Session {
                    path: path.clone(),
                    document,
                    connection,
                },
            );
            id
        };

        debug!("Added {} for {}", id, path.display());
        // No subscribers is fine
        let _ = self.events.send(SessionEvent::Added(id));
        id
    }

    /// Mark a session ready with its document. Returns false for unknown sessions.
    pub fn attach_document(&self, id: SessionId, document: DocumentHandle) -> bool {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        match sessions.by_id.get(&id) {
            Some(session) => {
                debug!("{} ready with {}", id, document.uri());
                session.document.send_replace(Some(document));
                true
            }
            None => false,
        }
    }

    pub fn remove_session(&self, id: SessionId) -> bool {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .by_id
            .remove(&id)
            .is_some();
        if removed {
            debug!("Removed {}", id);
            let _ = self.events.send(SessionEvent::Removed(id));
        }
        removed
    }

    /// Current sessions in id order
    pub fn snapshot(&self) -> Vec<SessionSnapshot> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions
            .by_id
            .iter()
            .map(|(id, session)| SessionSnapshot {
                id: *id,
                path: session.path.clone(),
                document: session.document.borrow().clone(),
            })
            .collect()
    }

    pub fn document(&self, id: SessionId) -> Option<DocumentHandle> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions
            .by_id
            .get(&id)
            .and_then(|session| session.document.borrow().clone())
    }

    pub fn connection(&self, id: SessionId) -> Option<Arc<ServerConnection>> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions
            .by_id
            .get(&id)
            .and_then(|session| session.connection.clone())
    }

    /// Distinct connections of every session holding this document
    pub fn connections_for(&self, document: &DocumentHandle) -> Vec<Arc<ServerConnection>> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        let mut connections: Vec<Arc<ServerConnection>> = Vec::new();
        for session in sessions.by_id.values() {
            let holds_document = session
                .document
                .borrow()
                .as_ref()
                .is_some_and(|held| Arc::ptr_eq(held, document));
            let Some(connection) = session.connection.as_ref().filter(|_| holds_document) else {
                continue;
            };
            if !connections.iter().any(|known| Arc::ptr_eq(known, connection)) {
                connections.push(connection.clone());
            }
        }
        connections
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .by_id
            .contains_key(&id)
    }

    /// Wait until the session has a document. `None` if the session goes away first.
    pub async fn wait_ready(&self, id: SessionId) -> Option<DocumentHandle> {
        let mut ready = {
            let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
            sessions.by_id.get(&id)?.document.subscribe()
        };

        // The sender is dropped together with the session
        ready
            .wait_for(|document| document.is_some())
            .await
            .ok()
            .and_then(|document| document.clone())
    }
}

//! Per-session arming of the `workspace/applyEdit` handler.
//!
//! A session's handler is installed once its document is ready and its server
//! has initialized with at least one `executeCommandProvider` command. Servers
//! without commands leave the session in `AwaitingServerInit` for good.

use lsp_types::ServerCapabilities;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::apply_edit::{ApplyEditHandler, APPLY_EDIT_METHOD};
use crate::editor::EditApplicator;
use crate::workspace::{SessionEvent, SessionId, SessionRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Unregistered,
    AwaitingReady,
    AwaitingServerInit,
    Armed,
}

#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    SessionAdded,
    DocumentReady,
    ServerInitialized(Box<ServerCapabilities>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    InstallHandler,
}

/// Whether the server advertises any executable command
pub fn declares_commands(capabilities: &ServerCapabilities) -> bool {
    capabilities
        .execute_command_provider
        .as_ref()
        .is_some_and(|provider| !provider.commands.is_empty())
}

/// Next state for an event. Pairs not listed leave the state unchanged.
pub fn transition(state: SessionState, event: &LifecycleEvent) -> (SessionState, Option<Action>) {
    use SessionState::*;

    match (state, event) {
        (Unregistered, LifecycleEvent::SessionAdded) => (AwaitingReady, None),
        (AwaitingReady, LifecycleEvent::DocumentReady) => (AwaitingServerInit, None),
        (AwaitingServerInit, LifecycleEvent::ServerInitialized(capabilities))
            if declares_commands(capabilities) =>
        {
            (Armed, Some(Action::InstallHandler))
        }
        (state, _) => (state, None),
    }
}

/// Drives every session of a registry through the lifecycle
pub struct Registrar {
    registry: Arc<SessionRegistry>,
    applicator: Arc<dyn EditApplicator>,
    states: watch::Sender<HashMap<SessionId, SessionState>>,
}

impl Registrar {
    pub fn new(registry: Arc<SessionRegistry>, applicator: Arc<dyn EditApplicator>) -> Arc<Self> {
        let (states, _) = watch::channel(HashMap::new());
        Arc::new(Self {
            registry,
            applicator,
            states,
        })
    }

    /// Track existing sessions and every session added from now on
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let registrar = self.clone();
        let mut events = self.registry.subscribe();

        tokio::spawn(async move {
            registrar.track_existing();
            loop {
                match events.recv().await {
                    Ok(SessionEvent::Added(id)) => registrar.spawn_tracking(id),
                    Ok(SessionEvent::Removed(id)) => registrar.forget(id),
                    Err(RecvError::Lagged(missed)) => {
                        warn!("Missed {} session events, rescanning", missed);
                        registrar.forget_removed();
                        registrar.track_existing();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    fn track_existing(self: &Arc<Self>) {
        for session in self.registry.snapshot() {
            self.spawn_tracking(session.id);
        }
    }

    fn forget(&self, id: SessionId) {
        debug!("{} removed", id);
        self.states.send_if_modified(|states| states.remove(&id).is_some());
    }

    fn forget_removed(&self) {
        self.states.send_if_modified(|states| {
            let before = states.len();
            states.retain(|id, _| self.registry.contains(*id));
            states.len() != before
        });
    }

    fn spawn_tracking(self: &Arc<Self>, id: SessionId) {
        let registrar = self.clone();
        tokio::spawn(async move { registrar.track_session(id).await });
    }

    /// Walk one session through the lifecycle. Returns the state it ended in.
    ///
    /// Tracking a session twice is a no-op.
    pub async fn track_session(&self, id: SessionId) -> SessionState {
        let (from, to, _) = self.advance(id, &LifecycleEvent::SessionAdded);
        if from != SessionState::Unregistered {
            return to;
        }

        let Some(document) = self.registry.wait_ready(id).await else {
            debug!("{} went away before its document was ready", id);
            return to;
        };
        let (_, to, _) = self.advance(id, &LifecycleEvent::DocumentReady);

        let Some(connection) = self.registry.connection(id) else {
            debug!("{} has no language server", id);
            return to;
        };
        let Some(capabilities) = connection.server_initialized().await else {
            debug!("Server for {} closed before initializing", id);
            return to;
        };

        match document.snapshot() {
            Ok((text, version)) => {
                let params = json!({
                    "textDocument": {
                        "uri": document.uri(),
                        "languageId": document.language_id(),
                        "version": version,
                        "text": text
                    }
                });
                if let Err(e) = connection.notify("textDocument/didOpen", params) {
                    warn!("Failed to send didOpen for {}: {}", document.uri(), e);
                }
            }
            Err(e) => warn!("Cannot read {}: {}", document.uri(), e),
        }

        // Install before publishing Armed so waiters never see an armed
        // session without its handler
        let event = LifecycleEvent::ServerInitialized(Box::new(capabilities));
        match transition(self.state(id), &event).1 {
            Some(Action::InstallHandler) => {
                let handler = ApplyEditHandler::new(&self.registry, self.applicator.clone());
                connection.on_request(APPLY_EDIT_METHOD, Arc::new(handler));
                info!("{} armed for {}", id, APPLY_EDIT_METHOD);
            }
            None => info!("Server for {} declares no commands, not handling edits", id),
        }
        self.advance(id, &event).1
    }

    pub fn state(&self, id: SessionId) -> SessionState {
        self.states
            .borrow()
            .get(&id)
            .copied()
            .unwrap_or(SessionState::Unregistered)
    }

    /// Wait until a session reaches `state`
    pub async fn wait_for_state(&self, id: SessionId, state: SessionState) {
        let mut states = self.states.subscribe();
        // The sender lives as long as self
        let _ = states
            .wait_for(|states| states.get(&id).copied().unwrap_or(SessionState::Unregistered) == state)
            .await;
    }

    fn advance(
        &self,
        id: SessionId,
        event: &LifecycleEvent,
    ) -> (SessionState, SessionState, Option<Action>) {
        let mut outcome = (SessionState::Unregistered, SessionState::Unregistered, None);
        self.states.send_if_modified(|states| {
            // Removed sessions are never recorded again
            if !self.registry.contains(id) {
                return false;
            }
            let from = states.get(&id).copied().unwrap_or(SessionState::Unregistered);
            let (to, action) = transition(from, event);
            outcome = (from, to, action);
            if from == to {
                return false;
            }
            debug!("{}: {:?} -> {:?}", id, from, to);
            states.insert(id, to);
            true
        });
        outcome
    }
}

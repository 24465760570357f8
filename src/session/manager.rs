//! Session management

use super::state::SessionState;
use crate::process::PanicSignal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// One client connection
#[derive(Debug)]
pub struct Session {
    id: String,
    authenticated: bool,
    created_at: i64,
    state: Arc<Mutex<SessionState>>,
    panic: Arc<PanicSignal>,
}

impl Session {
    /// Create a new session
    pub fn new(authenticated: bool, state: SessionState) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            authenticated,
            created_at: chrono::Utc::now().timestamp_millis(),
            state: Arc::new(Mutex::new(state)),
            panic: Arc::new(PanicSignal::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn state(&self) -> &Arc<Mutex<SessionState>> {
        &self.state
    }

    pub fn panic_signal(&self) -> &Arc<PanicSignal> {
        &self.panic
    }
}

/// Registry of live sessions
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session
    pub async fn create(&self, authenticated: bool, state: SessionState) -> Arc<Session> {
        let session = Arc::new(Session::new(authenticated, state));
        self.sessions
            .write()
            .await
            .insert(session.id().to_string(), session.clone());
        tracing::info!(
            session_id = %session.id(),
            authenticated,
            "Session created"
        );
        session
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Drop a session from the registry
    pub async fn remove(&self, session_id: &str) -> Option<Arc<Session>> {
        let removed = self.sessions.write().await.remove(session_id);
        if removed.is_some() {
            tracing::info!(session_id = %session_id, "Session removed");
        }
        removed
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Number of sessions with an invocation in flight
    pub async fn streaming_count(&self) -> usize {
        let sessions: Vec<_> = self.sessions.read().await.values().cloned().collect();
        let mut streaming = 0;
        for session in sessions {
            if session.state().lock().await.is_streaming() {
                streaming += 1;
            }
        }
        streaming
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{BackendKind, LlmProvider};
    use std::path::PathBuf;

    fn fresh_state() -> SessionState {
        SessionState::new(BackendKind::OpenInterpreter, LlmProvider::Auto, PathBuf::from("/"))
    }

    #[tokio::test]
    async fn test_create_get_remove() {
        let manager = SessionManager::new();
        let session = manager.create(true, fresh_state()).await;
        assert!(session.is_authenticated());
        assert_eq!(manager.count().await, 1);
        assert!(manager.get(session.id()).await.is_some());

        assert!(manager.remove(session.id()).await.is_some());
        assert!(manager.remove(session.id()).await.is_none());
        assert_eq!(manager.count().await, 0);
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let manager = SessionManager::new();
        let a = manager.create(true, fresh_state()).await;
        let b = manager.create(false, fresh_state()).await;
        assert_ne!(a.id(), b.id());

        a.state().lock().await.start_stream().unwrap();
        assert!(!b.state().lock().await.is_streaming());
        assert_eq!(manager.streaming_count().await, 1);

        a.panic_signal().begin("inv-a");
        b.panic_signal().trip();
        assert_eq!(a.panic_signal().active_invocation().as_deref(), Some("inv-a"));
    }
}

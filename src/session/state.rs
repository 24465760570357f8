//! Per-connection session state

use crate::error::{Error, Result};
use crate::settings::{BackendKind, LlmProvider};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::task::JoinHandle;

/// Stream mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    #[default]
    Idle,
    Streaming,
}

/// Transcript author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Transcript entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Mutable session state.
///
/// Guarded by the session's async mutex; the dispatcher and the bridge
/// never touch it concurrently.
#[derive(Debug)]
pub struct SessionState {
    agent_active: bool,
    stream: StreamState,
    backend: BackendKind,
    provider: LlmProvider,
    cursor: PathBuf,
    transcript: Vec<Message>,
    /// Delivery task of the active invocation
    pub(crate) active: Option<JoinHandle<()>>,
}

impl SessionState {
    pub fn new(backend: BackendKind, provider: LlmProvider, cursor: PathBuf) -> Self {
        Self {
            agent_active: false,
            stream: StreamState::Idle,
            backend,
            provider,
            cursor,
            transcript: Vec::new(),
            active: None,
        }
    }

    pub fn stream_state(&self) -> StreamState {
        self.stream
    }

    pub fn is_streaming(&self) -> bool {
        self.stream == StreamState::Streaming
    }

    /// Idle → Streaming. Fails if an invocation is already streaming.
    pub fn start_stream(&mut self) -> Result<()> {
        if self.is_streaming() {
            return Err(Error::ConcurrentInvocation);
        }
        self.stream = StreamState::Streaming;
        Ok(())
    }

    /// Streaming → Idle. Returns false if already idle.
    pub fn end_stream(&mut self) -> bool {
        let was_streaming = self.is_streaming();
        self.stream = StreamState::Idle;
        was_streaming
    }

    /// Force Idle from any state
    pub fn panic_reset(&mut self) {
        self.stream = StreamState::Idle;
        self.active = None;
    }

    pub fn agent_active(&self) -> bool {
        self.agent_active
    }

    pub fn set_agent_active(&mut self, active: bool) {
        self.agent_active = active;
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    pub fn set_provider(&mut self, provider: LlmProvider) {
        self.provider = provider;
    }

    /// Resolve a settings update against the current values.
    ///
    /// Both values are parsed before anything is returned; the state is not
    /// touched, so callers can persist first and then [`set_settings`].
    ///
    /// [`set_settings`]: Self::set_settings
    pub fn resolve_settings(
        &self,
        backend: Option<&str>,
        provider: Option<&str>,
    ) -> Result<(BackendKind, LlmProvider)> {
        let backend = match backend {
            Some(raw) => raw.parse::<BackendKind>()?,
            None => self.backend,
        };
        let provider = match provider {
            Some(raw) => raw.parse::<LlmProvider>()?,
            None => self.provider,
        };
        Ok((backend, provider))
    }

    pub fn set_settings(&mut self, backend: BackendKind, provider: LlmProvider) {
        self.backend = backend;
        self.provider = provider;
    }

    /// Last validated browse path
    pub fn cursor(&self) -> &PathBuf {
        &self.cursor
    }

    pub fn set_cursor(&mut self, cursor: PathBuf) {
        self.cursor = cursor;
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn push_message(&mut self, role: Role, content: impl Into<String>) {
        self.transcript.push(Message::new(role, content));
    }

    pub fn has_active_task(&self) -> bool {
        self.active.is_some()
    }

    pub(crate) fn take_active(&mut self) -> Option<JoinHandle<()>> {
        self.active.take()
    }
}

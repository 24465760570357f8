//! Agent invocation types

use crate::error::Result;
use crate::protocol::ServerFrame;
use crate::settings::{BackendKind, LlmProvider};

/// Kind of output fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    /// Prose, delivered as a `message` frame
    Text,
    /// Fenced code, delivered as a `code` frame
    Code,
}

/// One ordered output fragment of an invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamChunk {
    pub invocation_id: String,
    /// Position within the invocation, starting at 0
    pub seq: u64,
    pub kind: ChunkKind,
    pub content: String,
}

impl StreamChunk {
    pub fn to_frame(&self) -> ServerFrame {
        match self.kind {
            ChunkKind::Text => ServerFrame::Message {
                content: self.content.clone(),
            },
            ChunkKind::Code => ServerFrame::Code {
                content: self.content.clone(),
            },
        }
    }
}

/// One instruction for a backend
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub invocation_id: String,
    pub instruction: String,
    pub backend: BackendKind,
    pub provider: LlmProvider,
}

/// Where a running backend sends its output.
///
/// Called from the backend's own (blocking) thread.
pub trait ChunkSink: Send {
    /// Hand over one chunk. Blocks while the hand-off queue is full; fails
    /// once the invocation has been cancelled or its consumer is gone, in
    /// which case the backend must stop.
    fn emit(&mut self, kind: ChunkKind, content: String) -> Result<()>;

    /// Report a spawned child process. On error the process has already
    /// been killed and the backend must stop.
    fn spawned(&mut self, pid: u32) -> Result<()>;

    /// Report that a child process exited and was reaped
    fn exited(&mut self, pid: u32);

    fn is_cancelled(&self) -> bool;
}

/// A synchronous, chunk-emitting agent
pub trait AgentBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Run one instruction to completion, emitting output as it appears.
    fn run(&self, request: &AgentRequest, sink: &mut dyn ChunkSink) -> Result<()>;
}

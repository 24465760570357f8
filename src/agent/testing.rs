//! In-memory backends for tests

use super::types::{AgentBackend, AgentRequest, ChunkKind, ChunkSink};
use crate::error::{Error, Result};
use std::time::Duration;

/// Emits fixed chunks, optionally pausing first or failing at an index
pub struct ScriptedBackend {
    pub chunks: Vec<(ChunkKind, String)>,
    pub pause: Duration,
    pub fail_at: Option<usize>,
}

impl ScriptedBackend {
    pub fn new(chunks: &[(ChunkKind, &str)]) -> Self {
        Self {
            chunks: chunks
                .iter()
                .map(|(kind, content)| (*kind, content.to_string()))
                .collect(),
            pause: Duration::ZERO,
            fail_at: None,
        }
    }

    pub fn text(lines: &[&str]) -> Self {
        let chunks: Vec<_> = lines.iter().map(|line| (ChunkKind::Text, *line)).collect();
        Self::new(&chunks)
    }
}

impl AgentBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn run(&self, _request: &AgentRequest, sink: &mut dyn ChunkSink) -> Result<()> {
        std::thread::sleep(self.pause);
        for (i, (kind, content)) in self.chunks.iter().enumerate() {
            if self.fail_at == Some(i) {
                return Err(Error::AgentBackend("model quota exceeded".to_string()));
            }
            sink.emit(*kind, content.clone())?;
        }
        Ok(())
    }
}

/// Emits one chunk, then spins until cancelled
pub struct StuckBackend;

pub const STUCK_CHUNK: &str = "thinking\n";

impl AgentBackend for StuckBackend {
    fn name(&self) -> &str {
        "stuck"
    }

    fn run(&self, _request: &AgentRequest, sink: &mut dyn ChunkSink) -> Result<()> {
        sink.emit(ChunkKind::Text, STUCK_CHUNK.to_string())?;
        while !sink.is_cancelled() {
            std::thread::sleep(Duration::from_millis(10));
        }
        Err(Error::AgentBackend("invocation cancelled".to_string()))
    }
}

//! Agent module: backend interface, subprocess backends and the execution
//! bridge
//!
//! ## Architecture
//!
//! ```text
//! dispatcher ──start──▶ AgentBridge ──spawn_blocking──▶ AgentBackend::run
//!     ▲                      │                                │ emit()
//!     │                 delivery task ◀── bounded mpsc ◀──────┘
//!     │                      │
//!     └──── Notifier ◀───────┘  stream_start · message/code · stream_end
//! ```
//!
//! A panic cancels the invocation's token (observed at every chunk
//! boundary) and kills the recorded process trees, so a backend blocked
//! inside a child process still ends.

pub mod bridge;
pub mod subprocess;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use bridge::{AgentBridge, BridgeEvent, STILL_WORKING};
pub use subprocess::{find_on_path, SubprocessBackend};
pub use types::{AgentBackend, AgentRequest, ChunkKind, ChunkSink, StreamChunk};

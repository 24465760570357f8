//! Agent execution bridge
//!
//! Turns a blocking, chunk-emitting backend run into an ordered async
//! stream for one session. The backend runs on the blocking pool and hands
//! chunks over a bounded queue (a full queue blocks the backend, nothing is
//! dropped). A per-invocation delivery task forwards each chunk as soon as
//! it is dequeued and closes the stream exactly once.

use super::subprocess::SubprocessBackend;
use super::types::{AgentBackend, AgentRequest, ChunkKind, ChunkSink, StreamChunk};
use crate::config::AgentConfig;
use crate::error::{Error, Result};
use crate::notify::Notifier;
use crate::process::{self, PanicSignal};
use crate::protocol::ServerFrame;
use crate::session::{Role, Session};
use crate::settings::BackendKind;
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Text of the idle notification
pub const STILL_WORKING: &str = "⏳ Still working…";

/// What the delivery side observes from one invocation
#[derive(Debug)]
pub enum BridgeEvent {
    Chunk(StreamChunk),
    /// No chunk within the idle interval; the invocation keeps running
    StillWorking,
    /// The backend failed; the stream ends after this
    Failed(Error),
}

enum WorkerMsg {
    Chunk(StreamChunk),
    Done(Result<()>),
}

enum Step {
    Chunk(StreamChunk),
    Idle,
    Failed(Error),
    Stop,
}

/// Runs agent invocations for sessions
pub struct AgentBridge {
    backends: HashMap<BackendKind, Arc<dyn AgentBackend>>,
    queue_capacity: usize,
    idle_notice: Duration,
}

impl AgentBridge {
    pub fn new(queue_capacity: usize, idle_notice: Duration) -> Self {
        Self {
            backends: HashMap::new(),
            queue_capacity: queue_capacity.max(1),
            idle_notice,
        }
    }

    /// Bridge with both subprocess backends from config
    pub fn from_config(config: &AgentConfig, default_dir: &Path) -> Self {
        BackendKind::ALL.into_iter().fold(
            Self::new(config.queue_capacity, config.idle_notice()),
            |bridge, kind| {
                let backend = SubprocessBackend::new(
                    kind.as_str(),
                    config.command_for(kind).clone(),
                    default_dir,
                );
                bridge.with_backend(kind, Arc::new(backend))
            },
        )
    }

    pub fn with_backend(mut self, kind: BackendKind, backend: Arc<dyn AgentBackend>) -> Self {
        self.backends.insert(kind, backend);
        self
    }

    pub fn backend(&self, kind: BackendKind) -> Result<Arc<dyn AgentBackend>> {
        self.backends
            .get(&kind)
            .cloned()
            .ok_or_else(|| Error::Config(format!("no agent backend registered for {}", kind)))
    }

    // =========================================================================
    // Invocation
    // =========================================================================

    /// Start an invocation for `session` and return its id.
    ///
    /// Fails with `ConcurrentInvocation` while another one is streaming.
    /// The session is `Streaming` when this returns; `stream_start`, the
    /// content frames and the final `stream_end` all come from the delivery
    /// task, so the session lock is never held across a send.
    pub async fn start(
        &self,
        session: &Arc<Session>,
        notifier: &Notifier,
        instruction: String,
    ) -> Result<String> {
        let mut state = session.state().lock().await;
        let backend = self.backend(state.backend())?;
        state.start_stream()?;

        let invocation_id = uuid::Uuid::new_v4().to_string();
        state.push_message(Role::User, instruction.clone());
        let panic = session.panic_signal().clone();
        let token = panic.begin(&invocation_id);
        let request = AgentRequest {
            invocation_id: invocation_id.clone(),
            instruction,
            backend: state.backend(),
            provider: state.provider(),
        };

        tracing::info!(
            session_id = %session.id(),
            invocation_id = %invocation_id,
            backend = backend.name(),
            "Agent invocation started"
        );

        let events = self.invoke(backend, request, panic, token.clone());
        let handle = tokio::spawn(deliver(
            events,
            session.clone(),
            notifier.clone(),
            invocation_id.clone(),
            token,
        ));
        state.active = Some(handle);
        Ok(invocation_id)
    }

    /// Run `request` on the blocking pool and expose its output as a stream.
    ///
    /// The stream ends on completion, after one `Failed`, or as soon as
    /// `token` is cancelled. Chunks are checked against the token before
    /// they are yielded.
    pub fn invoke(
        &self,
        backend: Arc<dyn AgentBackend>,
        request: AgentRequest,
        panic: Arc<PanicSignal>,
        token: CancellationToken,
    ) -> impl Stream<Item = BridgeEvent> + Send + 'static {
        let (tx, mut rx) = mpsc::channel::<WorkerMsg>(self.queue_capacity);
        let idle = self.idle_notice;

        let mut sink = QueueSink {
            invocation_id: request.invocation_id.clone(),
            seq: 0,
            tx: tx.clone(),
            token: token.clone(),
            panic,
        };
        tokio::task::spawn_blocking(move || {
            let result = backend.run(&request, &mut sink);
            if let Err(e) = &result {
                tracing::debug!(
                    invocation_id = %request.invocation_id,
                    "Agent backend returned error: {}",
                    e
                );
            }
            let _ = tx.blocking_send(WorkerMsg::Done(result));
        });

        async_stream::stream! {
            loop {
                let step = tokio::select! {
                    biased;
                    _ = token.cancelled() => Step::Stop,
                    next = tokio::time::timeout(idle, rx.recv()) => match next {
                        Err(_) => Step::Idle,
                        Ok(Some(WorkerMsg::Chunk(chunk))) => Step::Chunk(chunk),
                        Ok(Some(WorkerMsg::Done(Ok(())))) => Step::Stop,
                        Ok(Some(WorkerMsg::Done(Err(e)))) => Step::Failed(e),
                        Ok(None) => Step::Failed(Error::AgentBackend(
                            "agent worker stopped unexpectedly".to_string(),
                        )),
                    },
                };
                match step {
                    Step::Chunk(chunk) => {
                        if token.is_cancelled() {
                            break;
                        }
                        yield BridgeEvent::Chunk(chunk);
                    }
                    Step::Idle => yield BridgeEvent::StillWorking,
                    Step::Failed(err) => {
                        if !token.is_cancelled() {
                            yield BridgeEvent::Failed(err);
                        }
                        break;
                    }
                    Step::Stop => break,
                }
            }
        }
    }
}

/// Forward one invocation's events, then close it under the session lock.
async fn deliver(
    events: impl Stream<Item = BridgeEvent> + Send + 'static,
    session: Arc<Session>,
    notifier: Notifier,
    invocation_id: String,
    token: CancellationToken,
) {
    notifier.send(ServerFrame::StreamStart).await;

    let mut events = Box::pin(events);
    let mut text = String::new();
    let mut chunks = 0usize;
    let mut failed = false;

    while let Some(event) = events.next().await {
        match event {
            BridgeEvent::Chunk(chunk) => {
                chunks += 1;
                text.push_str(&chunk.content);
                notifier.send(chunk.to_frame()).await;
            }
            BridgeEvent::StillWorking => {
                notifier.send(ServerFrame::notification(STILL_WORKING)).await;
            }
            BridgeEvent::Failed(err) => {
                failed = true;
                tracing::error!(
                    session_id = %session.id(),
                    invocation_id = %invocation_id,
                    "Agent invocation failed: {}",
                    err
                );
                notifier.send(ServerFrame::error(&err)).await;
            }
        }
    }
    drop(events);

    let cancelled = token.is_cancelled();
    let mut state = session.state().lock().await;
    session.panic_signal().finish(&invocation_id);
    if !failed && !cancelled {
        state.push_message(Role::Assistant, text);
    }
    state.active = None;
    let ended = state.end_stream();
    drop(state);
    if ended {
        notifier.send(ServerFrame::StreamEnd).await;
    }

    tracing::info!(
        session_id = %session.id(),
        invocation_id = %invocation_id,
        chunks,
        failed,
        cancelled,
        "Agent invocation finished"
    );
}

/// Worker-side end of the hand-off queue
struct QueueSink {
    invocation_id: String,
    seq: u64,
    tx: mpsc::Sender<WorkerMsg>,
    token: CancellationToken,
    panic: Arc<PanicSignal>,
}

fn cancelled() -> Error {
    Error::AgentBackend("invocation cancelled".to_string())
}

impl ChunkSink for QueueSink {
    fn emit(&mut self, kind: ChunkKind, content: String) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(cancelled());
        }
        let chunk = StreamChunk {
            invocation_id: self.invocation_id.clone(),
            seq: self.seq,
            kind,
            content,
        };
        self.seq += 1;
        self.tx
            .blocking_send(WorkerMsg::Chunk(chunk))
            .map_err(|_| cancelled())
    }

    fn spawned(&mut self, pid: u32) -> Result<()> {
        if self.panic.register_process(&self.invocation_id, pid) {
            Ok(())
        } else {
            process::kill_tree(pid);
            Err(cancelled())
        }
    }

    fn exited(&mut self, pid: u32) {
        self.panic.release_process(&self.invocation_id, pid);
    }

    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

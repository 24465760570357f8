//! Tool dispatcher
//!
//! Maps each [`Command`] to exactly one handler. Every failure is turned
//! into a single `error` frame (or, for `browse`, a `files` frame carrying
//! the error) and never ends the connection.

use crate::agent::AgentBridge;
use crate::error::{Error, Result};
use crate::jail::{self, Jail};
use crate::notify::Notifier;
use crate::process::PanicReport;
use crate::protocol::{Command, ServerFrame};
use crate::session::{Role, Session, SessionState};
use crate::settings::{keys, ApiKey, BackendKind, LlmProvider, SettingsStore, SettingsView};
use crate::tools::ToolProvider;
use base64::Engine;
use std::sync::Arc;
use std::time::Duration;

/// Reply to a panic
pub const PANIC_MESSAGE: &str = "🛑 PANIC: All agent processes stopped!";

/// Routes client commands for every session
pub struct Dispatcher {
    jail: Jail,
    bridge: AgentBridge,
    settings: Arc<dyn SettingsStore>,
    tools: Arc<dyn ToolProvider>,
    default_backend: BackendKind,
    default_provider: LlmProvider,
    panic_grace: Duration,
}

impl Dispatcher {
    pub fn new(
        jail: Jail,
        bridge: AgentBridge,
        settings: Arc<dyn SettingsStore>,
        tools: Arc<dyn ToolProvider>,
    ) -> Self {
        Self {
            jail,
            bridge,
            settings,
            tools,
            default_backend: BackendKind::default(),
            default_provider: LlmProvider::default(),
            panic_grace: Duration::from_secs(5),
        }
    }

    /// Backend / provider used when the settings store has no value
    pub fn with_defaults(mut self, backend: BackendKind, provider: LlmProvider) -> Self {
        self.default_backend = backend;
        self.default_provider = provider;
        self
    }

    pub fn with_panic_grace(mut self, grace: Duration) -> Self {
        self.panic_grace = grace;
        self
    }

    pub fn jail(&self) -> &Jail {
        &self.jail
    }

    /// Fresh state for a new connection, seeded from stored settings
    pub fn new_session_state(&self) -> SessionState {
        let backend = self
            .settings
            .get(keys::AGENT_BACKEND)
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.default_backend);
        let provider = self
            .settings
            .get(keys::LLM_PROVIDER)
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.default_provider);
        SessionState::new(backend, provider, self.jail.root().to_path_buf())
    }

    /// Parse and dispatch one text frame
    pub async fn dispatch_text(&self, session: &Arc<Session>, notifier: &Notifier, text: &str) {
        if !session.is_authenticated() {
            self.report(session, notifier, "unparsed", Error::AuthRejected)
                .await;
            return;
        }
        match Command::parse(text) {
            Ok(command) => self.dispatch(session, notifier, command).await,
            Err(e) => {
                let preview: String = text.chars().take(200).collect();
                tracing::debug!(session_id = %session.id(), raw = %preview, "Rejected frame");
                self.report(session, notifier, "unparsed", e).await;
            }
        }
    }

    /// Run one command, reporting any failure as an `error` frame
    pub async fn dispatch(&self, session: &Arc<Session>, notifier: &Notifier, command: Command) {
        let name = command.name();
        tracing::debug!(session_id = %session.id(), command = name, "Dispatching command");
        if let Err(e) = self.handle(session, notifier, command).await {
            self.report(session, notifier, name, e).await;
        }
    }

    async fn report(&self, session: &Session, notifier: &Notifier, command: &str, err: Error) {
        tracing::warn!(
            session_id = %session.id(),
            command,
            code = err.code(),
            "Command failed: {}",
            err
        );
        notifier.send(ServerFrame::error(&err)).await;
    }

    async fn handle(
        &self,
        session: &Arc<Session>,
        notifier: &Notifier,
        command: Command,
    ) -> Result<()> {
        if !session.is_authenticated() {
            return Err(Error::AuthRejected);
        }

        match command {
            Command::Status => {
                let content = self.tools.status().await?;
                notifier.send(ServerFrame::Status { content }).await;
            }
            Command::Screenshot => {
                let bytes = self.tools.screenshot().await?;
                let image = base64::engine::general_purpose::STANDARD.encode(bytes);
                notifier.send(ServerFrame::Screenshot { image }).await;
            }
            Command::Fetch { path } => self.handle_fetch(session, notifier, path).await?,
            Command::Panic => {
                let report = self.panic(session, notifier).await?;
                let content = if report.killed > 0 {
                    format!("{} ({} processes terminated)", PANIC_MESSAGE, report.killed)
                } else {
                    PANIC_MESSAGE.to_string()
                };
                notifier.send(ServerFrame::message(content)).await;
            }
            Command::Browse { path } => self.handle_browse(session, notifier, path).await,
            Command::Chat { message } => self.handle_chat(session, notifier, message).await?,
            Command::ToggleAgent { active } => {
                session.state().lock().await.set_agent_active(active);
                tracing::info!(session_id = %session.id(), active, "Agent mode toggled");
                let label = if active { "ON" } else { "OFF" };
                notifier
                    .send(ServerFrame::notification(format!("🤖 Agent mode: {}", label)))
                    .await;
            }
            Command::Settings { backend, provider } => {
                let (backend, provider) = session
                    .state()
                    .lock()
                    .await
                    .resolve_settings(backend.as_deref(), provider.as_deref())?;
                self.persist(move |store| {
                    store.set(keys::AGENT_BACKEND, backend.as_str())?;
                    store.set(keys::LLM_PROVIDER, provider.as_str())
                })
                .await?;
                session.state().lock().await.set_settings(backend, provider);
                tracing::info!(
                    session_id = %session.id(),
                    backend = %backend,
                    provider = %provider,
                    "Settings updated"
                );
                notifier.send(ServerFrame::message("⚙️ Settings updated")).await;
            }
            Command::SaveApiKey { provider, key } => {
                self.handle_save_api_key(session, notifier, &provider, key)
                    .await?
            }
            Command::GetSettings => {
                let content = self.settings_view(session).await;
                notifier.send(ServerFrame::Settings { content }).await;
            }
        }
        Ok(())
    }

    async fn handle_browse(&self, session: &Session, notifier: &Notifier, path: String) {
        match jail::browse(&self.jail, &path).await {
            Ok(listing) => {
                let files = listing.file_infos();
                session.state().lock().await.set_cursor(listing.dir.clone());
                notifier
                    .send(ServerFrame::Files {
                        path: listing.display_path,
                        files,
                        error: None,
                    })
                    .await;
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %session.id(),
                    path = %path,
                    code = e.code(),
                    "Browse refused: {}",
                    e
                );
                notifier.send(ServerFrame::files_error(path, &e)).await;
            }
        }
    }

    async fn handle_fetch(
        &self,
        session: &Session,
        notifier: &Notifier,
        path: Option<String>,
    ) -> Result<()> {
        let raw = match path {
            Some(path) => path,
            None => session.state().lock().await.cursor().display().to_string(),
        };
        let listing = jail::browse(&self.jail, &raw).await?;
        let content = self.jail.render_listing(&listing.dir, &listing.entries);
        notifier.send(ServerFrame::message(content)).await;
        Ok(())
    }

    async fn handle_chat(
        &self,
        session: &Arc<Session>,
        notifier: &Notifier,
        message: String,
    ) -> Result<()> {
        {
            let mut state = session.state().lock().await;
            if !state.agent_active() {
                state.push_message(Role::User, message);
                drop(state);
                notifier
                    .send(ServerFrame::message(
                        "Agent mode is off. Turn it on to run instructions on this machine.",
                    ))
                    .await;
                return Ok(());
            }
        }
        self.bridge.start(session, notifier, message).await?;
        Ok(())
    }

    async fn handle_save_api_key(
        &self,
        session: &Session,
        notifier: &Notifier,
        provider: &str,
        key: ApiKey,
    ) -> Result<()> {
        let invalid = || Error::Config("Invalid API key or provider".to_string());
        let provider: LlmProvider = provider.parse().map_err(|_| invalid())?;
        let setting = provider.api_key_setting().ok_or_else(invalid)?;
        if key.is_blank() {
            return Err(invalid());
        }

        self.persist(move |store| {
            store.set(setting, key.expose())?;
            store.set(keys::LLM_PROVIDER, provider.as_str())
        })
        .await?;
        session.state().lock().await.set_provider(provider);
        tracing::info!(session_id = %session.id(), provider = %provider, "API key saved");

        let label = match provider {
            LlmProvider::Anthropic => "Anthropic",
            _ => "OpenAI",
        };
        notifier
            .send(ServerFrame::message(format!("✅ {} API key saved!", label)))
            .await;
        Ok(())
    }

    /// Run a settings write on the blocking pool.
    ///
    /// Session state is only updated by the caller once this succeeds.
    async fn persist<F>(&self, write: F) -> Result<()>
    where
        F: FnOnce(&dyn SettingsStore) -> Result<()> + Send + 'static,
    {
        let store = self.settings.clone();
        tokio::task::spawn_blocking(move || write(store.as_ref()))
            .await
            .map_err(|e| Error::Internal(format!("settings write failed: {}", e)))?
    }

    async fn settings_view(&self, session: &Session) -> SettingsView {
        let state = session.state().lock().await;
        SettingsView {
            agent_backend: state.backend(),
            llm_provider: state.provider(),
            has_anthropic_key: self.settings.has(keys::ANTHROPIC_API_KEY),
            has_openai_key: self.settings.has(keys::OPENAI_API_KEY),
            agent_active: state.agent_active(),
            streaming: state.is_streaming(),
        }
    }

    /// Stop the session's invocation and force it back to Idle.
    ///
    /// Trips the panic signal (cancel + process tree kill), then waits up
    /// to the grace period for the delivery task to close the stream. If
    /// it does not, the task is aborted and `stream_end` is sent here.
    pub async fn panic(&self, session: &Session, notifier: &Notifier) -> Result<PanicReport> {
        let signal = session.panic_signal().clone();
        let report = tokio::task::spawn_blocking(move || signal.trip())
            .await
            .map_err(|e| Error::Internal(format!("panic task failed: {}", e)))?;

        let handle = session.state().lock().await.take_active();
        if let Some(mut handle) = handle {
            if tokio::time::timeout(self.panic_grace, &mut handle)
                .await
                .is_err()
            {
                tracing::warn!(
                    session_id = %session.id(),
                    "Invocation did not wind down within grace period; aborting delivery"
                );
                handle.abort();
                let _ = handle.await;
            }
        }

        let mut state = session.state().lock().await;
        let was_streaming = state.is_streaming();
        state.panic_reset();
        drop(state);
        if was_streaming {
            notifier.send(ServerFrame::StreamEnd).await;
        }

        tracing::info!(
            session_id = %session.id(),
            invocation = ?report.invocation,
            killed = report.killed,
            "Panic handled"
        );
        Ok(report)
    }

    /// Connection teardown: cancel anything in flight
    pub async fn teardown(&self, session: &Session, notifier: &Notifier) {
        if let Err(e) = self.panic(session, notifier).await {
            tracing::error!(session_id = %session.id(), "Teardown failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::{ScriptedBackend, StuckBackend, STUCK_CHUNK};
    use crate::agent::{AgentBackend, ChunkKind};
    use crate::settings::MemorySettingsStore;
    use crate::tools::StaticTools;
    use tempfile::TempDir;
    use tokio::sync::mpsc::Receiver;

    struct Fixture {
        dispatcher: Dispatcher,
        settings: Arc<MemorySettingsStore>,
        session: Arc<Session>,
        notifier: Notifier,
        rx: Receiver<ServerFrame>,
        _dir: TempDir,
    }

    fn fixture_with(backend: impl AgentBackend + 'static, authenticated: bool) -> Fixture {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("Documents")).unwrap();
        std::fs::write(dir.path().join("Documents/plan.md"), "# plan").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();

        let settings = Arc::new(MemorySettingsStore::new());
        let bridge = AgentBridge::new(8, Duration::from_secs(30))
            .with_backend(BackendKind::OpenInterpreter, Arc::new(backend));
        let tools = Arc::new(StaticTools {
            status: "🧠 CPU: 3.0% (8 cores)".to_string(),
            image: b"\x89PNG".to_vec(),
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(
            Jail::new(dir.path()).unwrap(),
            bridge,
            settings.clone(),
            tools,
        )
        .with_panic_grace(Duration::from_secs(2));

        let session = Arc::new(Session::new(authenticated, dispatcher.new_session_state()));
        let (notifier, rx) = Notifier::channel(session.id(), 128);
        Fixture {
            dispatcher,
            settings,
            session,
            notifier,
            rx,
            _dir: dir,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(ScriptedBackend::text(&["file-a\n", "file-b\n"]), true)
    }

    impl Fixture {
        async fn send(&self, frame: &str) {
            self.dispatcher
                .dispatch_text(&self.session, &self.notifier, frame)
                .await;
        }

        async fn next(&mut self) -> ServerFrame {
            tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
                .await
                .unwrap()
                .unwrap()
        }

        fn drain(&mut self) -> Vec<ServerFrame> {
            let mut frames = Vec::new();
            while let Ok(frame) = self.rx.try_recv() {
                frames.push(frame);
            }
            frames
        }

        async fn wait_idle(&self) {
            let handle = self.session.state().lock().await.take_active();
            if let Some(handle) = handle {
                handle.await.unwrap();
            }
        }
    }

    fn error_code(frame: &ServerFrame) -> &str {
        match frame {
            ServerFrame::Error { code, .. } => code,
            other => panic!("expected error frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let mut f = fixture();
        f.send(r#"{"action":"self_destruct"}"#).await;
        assert_eq!(error_code(&f.next().await), "UnknownCommand");
        f.send(r#"{"action":"tool","tool":"rm_rf"}"#).await;
        assert_eq!(error_code(&f.next().await), "UnknownCommand");
        f.send("{{{").await;
        assert_eq!(error_code(&f.next().await), "InvalidFrame");

        f.send(r#"{"action":"tool","tool":"status"}"#).await;
        assert!(matches!(f.next().await, ServerFrame::Status { .. }));
    }

    #[tokio::test]
    async fn test_unauthenticated_session_is_refused() {
        let mut f = fixture_with(ScriptedBackend::text(&["x\n"]), false);
        f.send(r#"{"action":"tool","tool":"status"}"#).await;
        assert_eq!(error_code(&f.next().await), "AuthRejected");
        f.send(r#"{"action":"toggle_agent","active":true}"#).await;
        assert_eq!(error_code(&f.next().await), "AuthRejected");
        f.send("garbage").await;
        assert_eq!(error_code(&f.next().await), "AuthRejected");

        f.dispatcher
            .dispatch(&f.session, &f.notifier, Command::Chat { message: "hi".into() })
            .await;
        assert_eq!(error_code(&f.next().await), "AuthRejected");

        let state = f.session.state().lock().await;
        assert!(!state.agent_active());
        assert!(state.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_status_and_screenshot() {
        let mut f = fixture();
        f.send(r#"{"action":"tool","tool":"status"}"#).await;
        assert_eq!(
            f.next().await,
            ServerFrame::Status {
                content: "🧠 CPU: 3.0% (8 cores)".to_string()
            }
        );
        f.send(r#"{"action":"tool","tool":"screenshot"}"#).await;
        assert_eq!(
            f.next().await,
            ServerFrame::Screenshot {
                image: "iVBORw==".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_browse_scenario() {
        let mut f = fixture();

        f.send(r#"{"action":"browse","path":"~"}"#).await;
        match f.next().await {
            ServerFrame::Files { path, files, error } => {
                assert_eq!(path, "~");
                assert!(error.is_none());
                assert_eq!(files[0].name, "Documents");
                assert!(files[0].is_dir);
                assert_eq!(files[1].name, "notes.txt");
                assert_eq!(files[1].size.as_deref(), Some("5 B"));
            }
            other => panic!("unexpected frame {:?}", other),
        }

        f.send(r#"{"action":"browse","path":"Documents"}"#).await;
        match f.next().await {
            ServerFrame::Files { path, files, .. } => {
                assert_eq!(path, "Documents");
                assert_eq!(files.len(), 1);
            }
            other => panic!("unexpected frame {:?}", other),
        }
        let cursor = f.session.state().lock().await.cursor().clone();
        assert_eq!(cursor, f.dispatcher.jail().root().join("Documents"));

        f.send(r#"{"action":"browse","path":"../../etc"}"#).await;
        match f.next().await {
            ServerFrame::Files { files, error, .. } => {
                assert!(files.is_empty());
                assert!(error.unwrap().contains("outside"));
            }
            other => panic!("unexpected frame {:?}", other),
        }
        let unchanged = f.session.state().lock().await.cursor().clone();
        assert_eq!(unchanged, cursor);

        f.send(r#"{"action":"browse","path":"missing"}"#).await;
        match f.next().await {
            ServerFrame::Files { error, .. } => {
                assert!(error.unwrap().contains("does not exist"))
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_uses_cursor() {
        let mut f = fixture();
        f.send(r#"{"action":"browse","path":"Documents"}"#).await;
        f.next().await;

        f.send(r#"{"action":"tool","tool":"fetch"}"#).await;
        match f.next().await {
            ServerFrame::Message { content } => {
                assert!(content.starts_with("📁 Documents"));
                assert!(content.contains("plan.md"));
            }
            other => panic!("unexpected frame {:?}", other),
        }

        f.send(r#"{"action":"tool","tool":"fetch","path":"/etc"}"#).await;
        assert_eq!(error_code(&f.next().await), "OutsideJail");
    }

    #[tokio::test]
    async fn test_chat_with_agent_off() {
        let mut f = fixture();
        f.send(r#"{"action":"chat","message":"hello"}"#).await;
        assert!(matches!(f.next().await, ServerFrame::Message { .. }));
        let state = f.session.state().lock().await;
        assert!(!state.is_streaming());
        assert_eq!(state.transcript().len(), 1);
    }

    #[tokio::test]
    async fn test_toggle_then_chat_streams() {
        let mut f = fixture();
        f.send(r#"{"action":"toggle_agent","active":true}"#).await;
        assert_eq!(f.next().await, ServerFrame::notification("🤖 Agent mode: ON"));

        f.send(r#"{"action":"chat","message":"list files"}"#).await;
        f.wait_idle().await;
        assert_eq!(
            f.drain(),
            vec![
                ServerFrame::StreamStart,
                ServerFrame::message("file-a\n"),
                ServerFrame::message("file-b\n"),
                ServerFrame::StreamEnd,
            ]
        );
        let state = f.session.state().lock().await;
        assert_eq!(state.transcript()[1].content, "file-a\nfile-b\n");
    }

    #[tokio::test]
    async fn test_chat_while_streaming_is_rejected() {
        let mut f = fixture_with(StuckBackend, true);
        f.send(r#"{"action":"toggle_agent","active":true}"#).await;
        f.next().await;

        f.send(r#"{"action":"chat","message":"first"}"#).await;
        assert_eq!(f.next().await, ServerFrame::StreamStart);
        assert_eq!(f.next().await, ServerFrame::message(STUCK_CHUNK));

        f.send(r#"{"action":"chat","message":"second"}"#).await;
        assert_eq!(error_code(&f.next().await), "ConcurrentInvocationError");

        f.send(r#"{"action":"tool","tool":"panic"}"#).await;
        let frames = f.drain();
        assert_eq!(
            frames,
            vec![ServerFrame::StreamEnd, ServerFrame::message(PANIC_MESSAGE)]
        );
        assert!(!f.session.state().lock().await.is_streaming());
    }

    #[tokio::test]
    async fn test_panic_when_idle_is_noop() {
        let mut f = fixture();
        f.send(r#"{"action":"tool","tool":"panic"}"#).await;
        assert_eq!(f.next().await, ServerFrame::message(PANIC_MESSAGE));
        assert!(!f.session.state().lock().await.is_streaming());

        let report = f.dispatcher.panic(&f.session, &f.notifier).await.unwrap();
        assert_eq!(report, PanicReport::default());
        assert!(f.drain().is_empty());
    }

    #[tokio::test]
    async fn test_double_panic() {
        let mut f = fixture_with(StuckBackend, true);
        f.session.state().lock().await.set_agent_active(true);
        f.send(r#"{"action":"chat","message":"go"}"#).await;
        assert_eq!(f.next().await, ServerFrame::StreamStart);
        assert_eq!(f.next().await, ServerFrame::message(STUCK_CHUNK));

        let (first, second) = tokio::join!(
            f.dispatcher.panic(&f.session, &f.notifier),
            f.dispatcher.panic(&f.session, &f.notifier)
        );
        let reports = [first.unwrap(), second.unwrap()];
        assert_eq!(reports.iter().filter(|r| r.invocation.is_some()).count(), 1);
        assert!(reports.iter().all(|r| r.killed == 0));

        let ends = f
            .drain()
            .into_iter()
            .filter(|frame| *frame == ServerFrame::StreamEnd)
            .count();
        assert_eq!(ends, 1);
    }

    #[tokio::test]
    async fn test_settings_update_and_validation() {
        let mut f = fixture();
        f.send(r#"{"action":"settings","agent_backend":"claude_code","llm_provider":"ollama"}"#)
            .await;
        assert_eq!(f.next().await, ServerFrame::message("⚙️ Settings updated"));
        assert_eq!(f.settings.get(keys::AGENT_BACKEND).as_deref(), Some("claude_code"));

        f.send(r#"{"action":"settings","agent_backend":"skynet","llm_provider":"openai"}"#)
            .await;
        assert_eq!(error_code(&f.next().await), "ConfigError");
        let state = f.session.state().lock().await;
        assert_eq!(state.backend(), BackendKind::ClaudeCode);
        assert_eq!(state.provider(), LlmProvider::Ollama);
        drop(state);

        let fresh = f.dispatcher.new_session_state();
        assert_eq!(fresh.backend(), BackendKind::ClaudeCode);
    }

    struct ReadOnlyStore;

    impl SettingsStore for ReadOnlyStore {
        fn get(&self, _key: &str) -> Option<String> {
            None
        }

        fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "settings file is read-only",
            )))
        }
    }

    #[tokio::test]
    async fn test_failed_settings_write_leaves_session_unchanged() {
        let dir = TempDir::new().unwrap();
        let dispatcher = Dispatcher::new(
            Jail::new(dir.path()).unwrap(),
            AgentBridge::new(8, Duration::from_secs(30)),
            Arc::new(ReadOnlyStore),
            Arc::new(StaticTools::default()),
        );
        let session = Arc::new(Session::new(true, dispatcher.new_session_state()));
        let (notifier, mut rx) = Notifier::channel(session.id(), 8);

        dispatcher
            .dispatch_text(
                &session,
                &notifier,
                r#"{"action":"settings","agent_backend":"claude_code","llm_provider":"ollama"}"#,
            )
            .await;
        assert_eq!(error_code(&rx.recv().await.unwrap()), "IoError");

        dispatcher
            .dispatch_text(
                &session,
                &notifier,
                r#"{"action":"save_api_key","provider":"openai","key":"sk-test"}"#,
            )
            .await;
        assert_eq!(error_code(&rx.recv().await.unwrap()), "IoError");

        let state = session.state().lock().await;
        assert_eq!(state.backend(), BackendKind::default());
        assert_eq!(state.provider(), LlmProvider::default());
    }

    #[tokio::test]
    async fn test_save_api_key_never_echoes_secret() {
        let mut f = fixture();
        let secret = "sk-ant-api03-TOPSECRET";
        f.send(&format!(
            r#"{{"action":"save_api_key","provider":"anthropic","key":"{}"}}"#,
            secret
        ))
        .await;
        f.send(r#"{"action":"get_settings"}"#).await;
        f.send(r#"{"action":"save_api_key","provider":"ollama","key":"abc"}"#)
            .await;
        f.send(r#"{"action":"save_api_key","provider":"openai","key":""}"#)
            .await;

        let frames = f.drain();
        assert_eq!(frames.len(), 4);
        for frame in &frames {
            assert!(!frame.to_json().unwrap().contains(secret));
        }
        assert_eq!(frames[0], ServerFrame::message("✅ Anthropic API key saved!"));
        match &frames[1] {
            ServerFrame::Settings { content } => {
                assert!(content.has_anthropic_key);
                assert!(!content.has_openai_key);
                assert_eq!(content.llm_provider, LlmProvider::Anthropic);
            }
            other => panic!("unexpected frame {:?}", other),
        }
        for frame in &frames[2..] {
            match frame {
                ServerFrame::Error { content, code } => {
                    assert_eq!(code, "ConfigError");
                    assert!(content.contains("Invalid API key or provider"));
                }
                other => panic!("unexpected frame {:?}", other),
            }
        }
        assert_eq!(f.settings.get(keys::ANTHROPIC_API_KEY).as_deref(), Some(secret));
        assert_eq!(f.settings.get(keys::LLM_PROVIDER).as_deref(), Some("anthropic"));
        assert!(!f.settings.has(keys::OPENAI_API_KEY));
    }

    #[tokio::test]
    async fn test_teardown_cancels_invocation() {
        let mut f = fixture_with(StuckBackend, true);
        f.session.state().lock().await.set_agent_active(true);
        f.send(r#"{"action":"chat","message":"go"}"#).await;
        assert_eq!(f.next().await, ServerFrame::StreamStart);
        assert_eq!(f.next().await, ServerFrame::message(STUCK_CHUNK));

        f.dispatcher.teardown(&f.session, &f.notifier).await;
        assert!(f.session.panic_signal().active_invocation().is_none());
        assert!(!f.session.state().lock().await.is_streaming());
        assert_eq!(f.drain(), vec![ServerFrame::StreamEnd]);
    }

    #[tokio::test]
    async fn test_code_chunks_become_code_frames() {
        let mut f = fixture_with(
            ScriptedBackend::new(&[(ChunkKind::Text, "Run:\n"), (ChunkKind::Code, "ls -la\n")]),
            true,
        );
        f.session.state().lock().await.set_agent_active(true);
        f.send(r#"{"action":"chat","message":"go"}"#).await;
        f.wait_idle().await;
        let frames = f.drain();
        assert_eq!(
            frames[2],
            ServerFrame::Code {
                content: "ls -la\n".to_string()
            }
        );
    }
}

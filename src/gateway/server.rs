//! Gateway server implementation

use super::auth::PairingToken;
use super::dispatcher::Dispatcher;
use super::handler;
use crate::agent::AgentBridge;
use crate::config::PocketClawConfig;
use crate::error::{Error, Result};
use crate::jail::Jail;
use crate::session::SessionManager;
use crate::settings::{JsonSettingsStore, SettingsStore};
use crate::tools::{SystemTools, ToolProvider};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Gateway server state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayState {
    /// Not started
    Stopped,
    /// Starting up
    Starting,
    /// Accepting connections
    Running,
    /// Draining sessions
    ShuttingDown,
}

/// PocketClaw gateway: owns the session registry and the dispatcher
pub struct Gateway {
    config: PocketClawConfig,
    state: Arc<RwLock<GatewayState>>,
    sessions: Arc<SessionManager>,
    dispatcher: Arc<Dispatcher>,
    auth: PairingToken,
    shutdown: RwLock<CancellationToken>,
}

impl Gateway {
    /// Create a gateway with the default collaborators for `config`
    pub fn new(config: PocketClawConfig) -> Result<Self> {
        GatewayBuilder::new().config(config).build()
    }

    /// Get current state
    pub async fn state(&self) -> GatewayState {
        *self.state.read().await
    }

    /// Start accepting connections
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if *state != GatewayState::Stopped {
            return Err(Error::Gateway("Gateway already running".to_string()));
        }
        *state = GatewayState::Starting;
        *self.shutdown.write().await = CancellationToken::new();
        *state = GatewayState::Running;
        drop(state);

        tracing::info!(
            jail_root = %self.dispatcher.jail().root().display(),
            auth_required = self.auth.is_required(),
            "PocketClaw gateway started on {}:{}",
            self.config.gateway.host,
            self.config.gateway.port
        );
        Ok(())
    }

    /// Stop the gateway.
    ///
    /// Every connection cancels its in-flight invocation and closes; this
    /// waits (bounded) for the session registry to drain.
    pub async fn stop(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if *state != GatewayState::Running {
            return Ok(());
        }
        *state = GatewayState::ShuttingDown;
        drop(state);

        tracing::info!("Stopping PocketClaw gateway");
        self.shutdown.read().await.cancel();

        let deadline = self.config.agent.panic_grace() + Duration::from_secs(1);
        let drained = tokio::time::timeout(deadline, async {
            while self.sessions.count().await > 0 {
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
        })
        .await
        .is_ok();
        if !drained {
            let remaining = self.sessions.count().await;
            tracing::warn!(remaining, "Sessions still open after shutdown grace period");
        }

        *self.state.write().await = GatewayState::Stopped;
        tracing::info!("PocketClaw gateway stopped");
        Ok(())
    }

    /// Serve HTTP / WebSocket on `listener` until the gateway is stopped
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        if self.state().await == GatewayState::Stopped {
            self.start().await?;
        }
        let shutdown = self.shutdown_token().await;
        let app = handler::router(self.clone());

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| Error::Gateway(format!("server error: {}", e)))?;

        self.stop().await
    }

    /// Bind the configured address and serve until Ctrl-C
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let addr = format!("{}:{}", self.config.gateway.host, self.config.gateway.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Gateway(format!("cannot bind {}: {}", addr, e)))?;
        tracing::info!("Listening on ws://{}/ws", addr);

        let gateway = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received");
                if let Err(e) = gateway.stop().await {
                    tracing::error!("Shutdown failed: {}", e);
                }
            }
        });

        self.serve(listener).await
    }

    pub fn config(&self) -> &PocketClawConfig {
        &self.config
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn auth(&self) -> &PairingToken {
        &self.auth
    }

    /// Token cancelled when the current run stops
    pub async fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.read().await.clone()
    }

    /// Get gateway status information
    pub async fn status(&self) -> GatewayStatus {
        GatewayStatus {
            state: format!("{:?}", self.state().await),
            version: env!("CARGO_PKG_VERSION").to_string(),
            session_count: self.sessions.count().await,
            streaming_sessions: self.sessions.streaming_count().await,
            auth_required: self.auth.is_required(),
            jail_root: self.dispatcher.jail().root().display().to_string(),
        }
    }
}

/// Gateway status information
#[derive(Debug, Clone, Serialize)]
pub struct GatewayStatus {
    /// Current state
    pub state: String,
    /// Crate version
    pub version: String,
    /// Open connections
    pub session_count: usize,
    /// Connections with an invocation in flight
    pub streaming_sessions: usize,
    /// Whether clients must present the pairing token
    pub auth_required: bool,
    /// Directory browsing is confined to
    pub jail_root: String,
}

/// Builder for Gateway
pub struct GatewayBuilder {
    config: PocketClawConfig,
    settings: Option<Arc<dyn SettingsStore>>,
    tools: Option<Arc<dyn ToolProvider>>,
    bridge: Option<AgentBridge>,
}

impl GatewayBuilder {
    /// Create a new builder with default config
    pub fn new() -> Self {
        Self {
            config: PocketClawConfig::default(),
            settings: None,
            tools: None,
            bridge: None,
        }
    }

    /// Set the configuration
    pub fn config(mut self, config: PocketClawConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the gateway host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.gateway.host = host.into();
        self
    }

    /// Set the gateway port
    pub fn port(mut self, port: u16) -> Self {
        self.config.gateway.port = port;
        self
    }

    /// Require `?token=` on connect
    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.config.gateway.auth_token = Some(token.into());
        self
    }

    /// Confine browsing to `root`
    pub fn jail_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.jail.root = Some(root.into());
        self
    }

    /// Replace the JSON settings file
    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings = Some(store);
        self
    }

    /// Replace the system status / screenshot tools
    pub fn tools(mut self, tools: Arc<dyn ToolProvider>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Replace the configured subprocess backends
    pub fn bridge(mut self, bridge: AgentBridge) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Build the gateway
    pub fn build(self) -> Result<Gateway> {
        let config = self.config;

        let jail = Jail::new(config.jail.root_dir())?
            .with_show_hidden(config.jail.show_hidden)
            .with_max_entries(config.jail.max_entries);

        let settings: Arc<dyn SettingsStore> = match self.settings {
            Some(store) => store,
            None => Arc::new(JsonSettingsStore::open(config.storage.settings_path())?),
        };
        let tools: Arc<dyn ToolProvider> = match self.tools {
            Some(tools) => tools,
            None => Arc::new(SystemTools::new(config.tools.screenshot_command.clone())),
        };
        let bridge = match self.bridge {
            Some(bridge) => bridge,
            None => AgentBridge::from_config(&config.agent, jail.root()),
        };

        let dispatcher = Dispatcher::new(jail, bridge, settings, tools)
            .with_defaults(config.agent.default_backend, config.llm.provider)
            .with_panic_grace(config.agent.panic_grace());
        let auth = PairingToken::new(config.gateway.auth_token.as_deref());

        Ok(Gateway {
            config,
            state: Arc::new(RwLock::new(GatewayState::Stopped)),
            sessions: Arc::new(SessionManager::new()),
            dispatcher: Arc::new(dispatcher),
            auth,
            shutdown: RwLock::new(CancellationToken::new()),
        })
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

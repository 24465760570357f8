//! PocketClaw configuration management

use crate::error::{Error, Result};
use crate::settings::{BackendKind, LlmProvider};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main PocketClaw configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PocketClawConfig {
    /// Gateway configuration
    pub gateway: GatewayConfig,

    /// Agent execution configuration
    pub agent: AgentConfig,

    /// LLM provider configuration
    pub llm: LlmConfig,

    /// File jail configuration
    pub jail: JailConfig,

    /// Read-only tool configuration
    pub tools: ToolsConfig,

    /// Storage configuration
    pub storage: StorageConfig,
}

impl PocketClawConfig {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, `~/.pocketclaw/config.toml`
    /// is used when present, otherwise defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = default_base_dir().join("config.toml");
                if default_path.exists() {
                    Self::from_file(&default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Render as pretty TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Per-connection outbound frame queue depth
    pub outbound_queue: usize,

    /// Shared secret clients pass as `?token=` (None = no pairing check)
    pub auth_token: Option<String>,

    /// Allowed origins for CORS (empty = any)
    pub allowed_origins: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8888,
            outbound_queue: 256,
            auth_token: None,
            allowed_origins: Vec::new(),
        }
    }
}

/// External agent CLI invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Program to execute (looked up on PATH)
    pub program: String,

    /// Arguments placed before the instruction
    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory (None = jail root)
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            working_dir: None,
        }
    }
}

/// Agent execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Backend used when the settings store has no selection
    pub default_backend: BackendKind,

    /// Capacity of the worker → delivery hand-off queue
    pub queue_capacity: usize,

    /// Seconds without a chunk before a "still working" notification
    pub idle_notice_secs: u64,

    /// Seconds `panic` waits for the invocation to wind down
    pub panic_grace_secs: u64,

    /// Interpreter-style backend command
    pub open_interpreter: CommandSpec,

    /// Computer-use-style backend command
    pub claude_code: CommandSpec,
}

impl AgentConfig {
    pub fn idle_notice(&self) -> Duration {
        Duration::from_secs(self.idle_notice_secs.max(1))
    }

    pub fn panic_grace(&self) -> Duration {
        Duration::from_secs(self.panic_grace_secs)
    }

    pub fn command_for(&self, kind: BackendKind) -> &CommandSpec {
        match kind {
            BackendKind::OpenInterpreter => &self.open_interpreter,
            BackendKind::ClaudeCode => &self.claude_code,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            default_backend: BackendKind::OpenInterpreter,
            queue_capacity: 64,
            idle_notice_secs: 20,
            panic_grace_secs: 5,
            open_interpreter: CommandSpec::new("interpreter", &["--auto_run", "--plain"]),
            claude_code: CommandSpec::new(
                "claude",
                &["--print", "--output-format", "text", "--dangerously-skip-permissions"],
            ),
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider used when the settings store has no selection
    pub provider: LlmProvider,

    /// Ollama API host
    pub ollama_host: String,

    /// Ollama model
    pub ollama_model: String,

    /// OpenAI model
    pub openai_model: String,

    /// Anthropic model
    pub anthropic_model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Auto,
            ollama_host: "http://localhost:11434".to_string(),
            ollama_model: "llama3.2".to_string(),
            openai_model: "gpt-4o".to_string(),
            anthropic_model: "claude-sonnet-4-20250514".to_string(),
        }
    }
}

/// File jail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JailConfig {
    /// Root directory (None = home directory)
    pub root: Option<PathBuf>,

    /// List dot-files
    pub show_hidden: bool,

    /// Maximum entries returned per listing
    pub max_entries: usize,
}

impl JailConfig {
    /// Root directory, falling back to the user's home
    pub fn root_dir(&self) -> PathBuf {
        self.root
            .clone()
            .or_else(dirs_next::home_dir)
            .unwrap_or_else(|| PathBuf::from("/"))
    }
}

impl Default for JailConfig {
    fn default() -> Self {
        Self {
            root: None,
            show_hidden: false,
            max_entries: 50,
        }
    }
}

/// Read-only tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Screenshot command; must write a PNG to stdout
    pub screenshot_command: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        let command: &[&str] = if cfg!(target_os = "macos") {
            &["screencapture", "-x", "-t", "png", "/dev/stdout"]
        } else {
            &["import", "-window", "root", "png:-"]
        };
        Self {
            screenshot_command: command.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base directory for persisted state
    pub base_dir: PathBuf,
}

impl StorageConfig {
    pub fn settings_path(&self) -> PathBuf {
        self.base_dir.join("settings.json")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
        }
    }
}

/// `~/.pocketclaw`
pub fn default_base_dir() -> PathBuf {
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".pocketclaw")
}

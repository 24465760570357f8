//! Wire protocol
//!
//! Inbound frames are JSON objects keyed by `action` (and `tool` for the
//! `tool` action). They are parsed into the closed [`Command`] union so the
//! dispatcher can match exhaustively. Outbound frames are [`ServerFrame`],
//! tagged by `type`.

use crate::error::{Error, Result};
use crate::settings::{ApiKey, SettingsView};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `{action:"tool", tool:"status"}`
    Status,
    /// `{action:"tool", tool:"screenshot"}`
    Screenshot,
    /// `{action:"tool", tool:"fetch", path?}`, or the older
    /// `{action:"navigate", path}`
    Fetch { path: Option<String> },
    /// `{action:"tool", tool:"panic"}`
    Panic,
    /// `{action:"browse", path}`
    Browse { path: String },
    /// `{action:"chat", message}`
    Chat { message: String },
    /// `{action:"toggle_agent", active}`
    ToggleAgent { active: bool },
    /// `{action:"settings", agent_backend?, llm_provider?}`
    Settings {
        backend: Option<String>,
        provider: Option<String>,
    },
    /// `{action:"save_api_key", provider, key}`
    SaveApiKey { provider: String, key: ApiKey },
    /// `{action:"get_settings"}`
    GetSettings,
}

#[derive(Deserialize)]
struct ToolPayload {
    tool: String,
    #[serde(default)]
    path: Option<String>,
}

#[derive(Deserialize)]
struct BrowsePayload {
    #[serde(default)]
    path: String,
}

#[derive(Deserialize)]
struct ChatPayload {
    message: String,
}

#[derive(Deserialize)]
struct TogglePayload {
    active: bool,
}

#[derive(Deserialize)]
struct SettingsPayload {
    #[serde(default)]
    agent_backend: Option<String>,
    #[serde(default)]
    llm_provider: Option<String>,
}

#[derive(Deserialize)]
struct ApiKeyPayload {
    #[serde(default)]
    provider: String,
    #[serde(default)]
    key: String,
}

impl Command {
    /// Parse a text frame.
    ///
    /// Unrecognised `action` or `tool` names yield `UnknownCommand`; anything
    /// that is not a JSON object with the fields the action needs yields
    /// `InvalidFrame`.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::InvalidFrame(format!("not valid JSON: {}", e)))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let action = value
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidFrame("missing 'action' field".to_string()))?
            .to_string();

        match action.as_str() {
            "tool" => {
                let payload: ToolPayload = payload(&action, value)?;
                match payload.tool.as_str() {
                    "status" => Ok(Command::Status),
                    "screenshot" => Ok(Command::Screenshot),
                    "fetch" => Ok(Command::Fetch { path: payload.path }),
                    "panic" => Ok(Command::Panic),
                    other => Err(Error::UnknownCommand(format!("tool '{}'", other))),
                }
            }
            "browse" => {
                let payload: BrowsePayload = payload(&action, value)?;
                Ok(Command::Browse { path: payload.path })
            }
            "navigate" => {
                let payload: BrowsePayload = payload(&action, value)?;
                Ok(Command::Fetch {
                    path: Some(payload.path),
                })
            }
            "chat" => {
                let payload: ChatPayload = payload(&action, value)?;
                Ok(Command::Chat {
                    message: payload.message,
                })
            }
            "toggle_agent" => {
                let payload: TogglePayload = payload(&action, value)?;
                Ok(Command::ToggleAgent {
                    active: payload.active,
                })
            }
            "settings" => {
                let payload: SettingsPayload = payload(&action, value)?;
                Ok(Command::Settings {
                    backend: payload.agent_backend,
                    provider: payload.llm_provider,
                })
            }
            "save_api_key" => {
                let payload: ApiKeyPayload = payload(&action, value)?;
                Ok(Command::SaveApiKey {
                    provider: payload.provider,
                    key: ApiKey::new(payload.key),
                })
            }
            "get_settings" => Ok(Command::GetSettings),
            other => Err(Error::UnknownCommand(other.to_string())),
        }
    }

    /// Short name used in log fields
    pub fn name(&self) -> &'static str {
        match self {
            Command::Status => "status",
            Command::Screenshot => "screenshot",
            Command::Fetch { .. } => "fetch",
            Command::Panic => "panic",
            Command::Browse { .. } => "browse",
            Command::Chat { .. } => "chat",
            Command::ToggleAgent { .. } => "toggle_agent",
            Command::Settings { .. } => "settings",
            Command::SaveApiKey { .. } => "save_api_key",
            Command::GetSettings => "get_settings",
        }
    }
}

fn payload<T: serde::de::DeserializeOwned>(action: &str, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| Error::InvalidFrame(format!("bad '{}' frame: {}", action, e)))
}

/// One entry of a `files` frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    #[serde(rename = "isDir")]
    pub is_dir: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

/// Server → client frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Notification {
        content: String,
    },
    Message {
        content: String,
    },
    Status {
        content: String,
    },
    Screenshot {
        image: String,
    },
    Files {
        path: String,
        files: Vec<FileInfo>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Error {
        content: String,
        code: String,
    },
    StreamStart,
    StreamEnd,
    Code {
        content: String,
    },
    Settings {
        content: SettingsView,
    },
}

impl ServerFrame {
    pub fn notification(content: impl Into<String>) -> Self {
        ServerFrame::Notification {
            content: content.into(),
        }
    }

    pub fn message(content: impl Into<String>) -> Self {
        ServerFrame::Message {
            content: content.into(),
        }
    }

    /// `error` frame carrying the error text and its stable code
    pub fn error(err: &Error) -> Self {
        ServerFrame::Error {
            content: err.to_string(),
            code: err.code().to_string(),
        }
    }

    /// `files` frame for a failed browse: empty listing plus the error text
    pub fn files_error(path: impl Into<String>, err: &Error) -> Self {
        ServerFrame::Files {
            path: path.into(),
            files: Vec::new(),
            error: Some(err.to_string()),
        }
    }

    /// Frame type tag, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ServerFrame::Notification { .. } => "notification",
            ServerFrame::Message { .. } => "message",
            ServerFrame::Status { .. } => "status",
            ServerFrame::Screenshot { .. } => "screenshot",
            ServerFrame::Files { .. } => "files",
            ServerFrame::Error { .. } => "error",
            ServerFrame::StreamStart => "stream_start",
            ServerFrame::StreamEnd => "stream_end",
            ServerFrame::Code { .. } => "code",
            ServerFrame::Settings { .. } => "settings",
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

//! Settings wire types
//!
//! Fixed enumerations for the agent backend and LLM provider, the redacting
//! API key wrapper, and the camelCase settings view sent to clients.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Agent backend flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Interpreter-style agent (shell / code execution loop)
    #[default]
    OpenInterpreter,
    /// Computer-use-style agent (file edits, shell, vision)
    ClaudeCode,
}

impl BackendKind {
    pub const ALL: [BackendKind; 2] = [BackendKind::OpenInterpreter, BackendKind::ClaudeCode];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::OpenInterpreter => "open_interpreter",
            BackendKind::ClaudeCode => "claude_code",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        BackendKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| {
                Error::Config(format!(
                    "unknown agent backend '{}' (expected open_interpreter or claude_code)",
                    s
                ))
            })
    }
}

/// LLM provider selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    /// Try Ollama, then OpenAI, then Anthropic
    #[default]
    Auto,
    Ollama,
    Openai,
    Anthropic,
}

impl LlmProvider {
    pub const ALL: [LlmProvider; 4] = [
        LlmProvider::Auto,
        LlmProvider::Ollama,
        LlmProvider::Openai,
        LlmProvider::Anthropic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::Auto => "auto",
            LlmProvider::Ollama => "ollama",
            LlmProvider::Openai => "openai",
            LlmProvider::Anthropic => "anthropic",
        }
    }

    /// Settings key holding this provider's API key, if it takes one.
    pub fn api_key_setting(&self) -> Option<&'static str> {
        match self {
            LlmProvider::Openai => Some(keys::OPENAI_API_KEY),
            LlmProvider::Anthropic => Some(keys::ANTHROPIC_API_KEY),
            LlmProvider::Auto | LlmProvider::Ollama => None,
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LlmProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        LlmProvider::ALL
            .into_iter()
            .find(|provider| provider.as_str() == s.trim())
            .ok_or_else(|| {
                Error::Config(format!(
                    "unknown llm provider '{}' (expected auto, ollama, openai or anthropic)",
                    s
                ))
            })
    }
}

/// Keys understood by the settings store
pub mod keys {
    pub const AGENT_BACKEND: &str = "agent_backend";
    pub const LLM_PROVIDER: &str = "llm_provider";
    pub const ANTHROPIC_API_KEY: &str = "anthropic_api_key";
    pub const OPENAI_API_KEY: &str = "openai_api_key";
}

/// API key submitted by a client.
///
/// `Debug` never prints the secret and the buffer is wiped on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(****)")
    }
}

/// Settings snapshot sent in the `settings` frame (no key material)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsView {
    pub agent_backend: BackendKind,
    pub llm_provider: LlmProvider,
    pub has_anthropic_key: bool,
    pub has_openai_key: bool,
    pub agent_active: bool,
    pub streaming: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!(
            "open_interpreter".parse::<BackendKind>().unwrap(),
            BackendKind::OpenInterpreter
        );
        assert_eq!(
            "claude_code".parse::<BackendKind>().unwrap(),
            BackendKind::ClaudeCode
        );
        let err = "gpt-engineer".parse::<BackendKind>().unwrap_err();
        assert_eq!(err.code(), "ConfigError");
    }

    #[test]
    fn test_llm_provider_parse() {
        for provider in LlmProvider::ALL {
            assert_eq!(provider.as_str().parse::<LlmProvider>().unwrap(), provider);
        }
        assert!("gemini".parse::<LlmProvider>().is_err());
    }

    #[test]
    fn test_api_key_setting() {
        assert_eq!(LlmProvider::Openai.api_key_setting(), Some(keys::OPENAI_API_KEY));
        assert_eq!(LlmProvider::Ollama.api_key_setting(), None);
    }

    #[test]
    fn test_api_key_debug_is_redacted() {
        let key = ApiKey::new("sk-ant-REDACTED");
        let debug = format!("{:?}", key);
        assert_eq!(debug, "ApiKey(****)");
        assert!(!debug.contains("abcdef"));
        assert_eq!(key.expose(), "sk-ant-REDACTED");
    }

    #[test]
    fn test_api_key_blank() {
        assert!(ApiKey::new("   ").is_blank());
        assert!(!ApiKey::new("k").is_blank());
    }

    #[test]
    fn test_settings_view_serialization() {
        let view = SettingsView {
            agent_backend: BackendKind::ClaudeCode,
            llm_provider: LlmProvider::Anthropic,
            has_anthropic_key: true,
            has_openai_key: false,
            agent_active: true,
            streaming: false,
        };
        let json = serde_json::to_string(&view).unwrap();
        assert!(json.contains("\"agentBackend\":\"claude_code\""));
        assert!(json.contains("\"llmProvider\":\"anthropic\""));
        assert!(json.contains("\"hasAnthropicKey\":true"));
        assert!(json.contains("\"agentActive\":true"));
    }
}

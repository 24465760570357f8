//! PocketClaw error types

use thiserror::Error;

/// PocketClaw error type
///
/// Every variant is recovered at the dispatcher / bridge boundary and
/// surfaced to the client as a single `error` frame carrying [`Error::code`].
#[derive(Error, Debug)]
pub enum Error {
    /// Command name not recognised by the dispatcher
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Frame could not be parsed into a command
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Configuration error (bad setting value, unreadable config file)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Path resolves outside the jail root
    #[error("Access denied: {0} is outside the allowed directory")]
    OutsideJail(String),

    /// Path does not exist
    #[error("Path does not exist: {0}")]
    NotFound(String),

    /// Path is not readable
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// A second invocation was requested while one is streaming
    #[error("An agent invocation is already running; wait for it to finish or press panic")]
    ConcurrentInvocation,

    /// The agent backend failed
    #[error("Agent backend error: {0}")]
    AgentBackend(String),

    /// Too many commands queued for one connection
    #[error("Busy: too many pending commands, try again shortly")]
    Busy,

    /// Sender is not authenticated
    #[error("Unauthorized: this session is not paired with the agent")]
    AuthRejected,

    /// Gateway lifecycle error
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Status / screenshot provider failure
    #[error("Tool error: {0}")]
    Tool(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable code carried in `error` frames.
    pub fn code(&self) -> &'static str {
        match self {
            Error::UnknownCommand(_) => "UnknownCommand",
            Error::InvalidFrame(_) => "InvalidFrame",
            Error::Config(_) => "ConfigError",
            Error::OutsideJail(_) => "OutsideJail",
            Error::NotFound(_) => "NotFound",
            Error::PermissionDenied(_) => "PermissionDenied",
            Error::NotADirectory(_) => "NotADirectory",
            Error::ConcurrentInvocation => "ConcurrentInvocationError",
            Error::AgentBackend(_) => "AgentBackendError",
            Error::Busy => "Busy",
            Error::AuthRejected => "AuthRejected",
            Error::Gateway(_) => "GatewayError",
            Error::Tool(_) => "ToolError",
            Error::Io(_) => "IoError",
            Error::Serialization(_) => "SerializationError",
            Error::Internal(_) => "InternalError",
        }
    }

    /// Map an IO error raised while touching `path` onto the jail taxonomy.
    pub fn from_path_io(err: std::io::Error, path: &str) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(path.to_string()),
            std::io::ErrorKind::PermissionDenied => Error::PermissionDenied(path.to_string()),
            _ => Error::Io(err),
        }
    }
}

/// Result type alias for PocketClaw operations
pub type Result<T> = std::result::Result<T, Error>;

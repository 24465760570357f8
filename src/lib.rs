//! PocketClaw - remote control bridge for a local automation agent
//!
//! A phone connects over WebSocket and drives an agent CLI running on this
//! machine. The bridge streams the agent's output back chunk by chunk, lets
//! the phone browse files inside a single jailed directory, and can stop
//! every agent process on demand.
//!
//! ## Architecture
//!
//! ```text
//! phone ──ws──▶ gateway::handler ──▶ gateway::Dispatcher
//!                    ▲                 │   │   │
//!                    │                 │   │   └── jail::Jail (browse / fetch)
//!                    │                 │   └────── tools (status / screenshot)
//!                    │                 └────────── agent::AgentBridge ──▶ CLI subprocess
//!                    │                                      │
//!                    └──────── notify::Notifier ◀───────────┘
//! ```
//!
//! Each connection owns a [`session::Session`]: agent mode flag, stream
//! state, browse cursor, backend/provider selection and transcript. At
//! most one invocation streams per session; `panic` cancels it and kills
//! its process trees via [`process::PanicSignal`].
//!
//! ## Modules
//!
//! - [`gateway`]: WebSocket server, pairing check and command dispatch
//! - [`protocol`]: Client commands and server frames
//! - [`agent`]: Backend interface, subprocess backends, execution bridge
//! - [`session`]: Per-connection state machine and registry
//! - [`jail`]: Directory navigation confined to one root
//! - [`process`]: Process tree kill and the panic signal
//! - [`notify`]: Ordered per-session outbound channel
//! - [`settings`]: Backend/provider selection and API key storage
//! - [`tools`]: Host status report and screenshots
//! - [`config`]: Configuration management

pub mod agent;
pub mod config;
pub mod error;
pub mod gateway;
pub mod jail;
pub mod notify;
pub mod process;
pub mod protocol;
pub mod session;
pub mod settings;
pub mod tools;

pub use config::PocketClawConfig;
pub use error::{Error, Result};

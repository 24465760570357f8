//! Settings module: agent/provider selection and key storage
//!
//! Setting values are validated against fixed enumerations before they are
//! stored. API keys are write-only from the client's point of view: the
//! settings view only reports whether a key is present.

pub mod store;
pub mod types;

pub use store::{JsonSettingsStore, MemorySettingsStore, SettingsStore};
pub use types::{keys, ApiKey, BackendKind, LlmProvider, SettingsView};

//! Session state machine and session registry

mod manager;
mod state;

pub use manager::{Session, SessionManager};
pub use state::{Message, Role, SessionState, StreamState};

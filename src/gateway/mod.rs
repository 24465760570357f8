//! Gateway for PocketClaw
//!
//! WebSocket control plane for a paired phone client: connection pairing,
//! command dispatch and server lifecycle.

mod auth;
mod dispatcher;
mod handler;
mod server;

pub use auth::PairingToken;
pub use dispatcher::{Dispatcher, PANIC_MESSAGE};
pub use handler::{router, WELCOME};
pub use server::{Gateway, GatewayBuilder, GatewayState, GatewayStatus};

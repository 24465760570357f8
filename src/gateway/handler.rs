//! HTTP / WebSocket surface
//!
//! `/ws` upgrades to the client protocol; `/health` and `/status` are plain
//! JSON health endpoints.

use super::server::{Gateway, GatewayState};
use crate::error::Error;
use crate::notify::Notifier;
use crate::protocol::{Command, ServerFrame};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Notification sent when a connection opens
pub const WELCOME: &str = "👋 Connected to PocketClaw";

/// Frames a connection may queue behind the command being handled
const PENDING_COMMANDS: usize = 32;

/// Build the gateway router
pub fn router(gateway: Arc<Gateway>) -> Router {
    let cors = build_cors(&gateway.config().gateway.allowed_origins);
    Router::new()
        .route("/ws", get(ws_upgrade))
        .route("/health", get(health_check))
        .route("/status", get(get_status))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(gateway)
}

fn build_cors(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        cors.allow_origin(parsed)
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    state: String,
    version: &'static str,
    sessions: usize,
}

async fn health_check(State(gateway): State<Arc<Gateway>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        state: format!("{:?}", gateway.state().await),
        version: env!("CARGO_PKG_VERSION"),
        sessions: gateway.sessions().count().await,
    })
}

async fn get_status(State(gateway): State<Arc<Gateway>>) -> impl IntoResponse {
    Json(gateway.status().await)
}

#[derive(Debug, Default, Deserialize)]
struct ConnectQuery {
    token: Option<String>,
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(gateway): State<Arc<Gateway>>,
    Query(query): Query<ConnectQuery>,
) -> Response {
    if gateway.state().await != GatewayState::Running {
        return (StatusCode::SERVICE_UNAVAILABLE, "gateway is not running").into_response();
    }
    let authenticated = gateway.auth().verify(query.token.as_deref());
    if !authenticated {
        tracing::warn!("Connection without a valid pairing token; commands will be refused");
    }
    ws.on_upgrade(move |socket| handle_socket(socket, gateway, authenticated))
}

/// One client connection.
///
/// Outbound frames go through the session's [`Notifier`] to a writer task.
/// Inbound text frames are handled in order by a per-connection worker,
/// except `panic`, which the reader runs at once so a slow tool call never
/// delays it. On close or shutdown any running invocation is cancelled
/// before the session is dropped.
async fn handle_socket(socket: WebSocket, gateway: Arc<Gateway>, authenticated: bool) {
    let dispatcher = gateway.dispatcher().clone();
    let session = gateway
        .sessions()
        .create(authenticated, dispatcher.new_session_state())
        .await;
    let session_id = session.id().to_string();
    tracing::info!(session_id = %session_id, authenticated, "Client connected");

    let (notifier, mut rx) =
        Notifier::channel(session_id.clone(), gateway.config().gateway.outbound_queue);
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let writer_session = session_id.clone();
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = match frame.to_json() {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(session_id = %writer_session, "Unserializable frame: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(text)).await.is_err() {
                tracing::debug!(session_id = %writer_session, "WebSocket send failed");
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    notifier.send(ServerFrame::notification(WELCOME)).await;

    let (commands, mut pending) = mpsc::channel::<String>(PENDING_COMMANDS);
    let worker = {
        let dispatcher = dispatcher.clone();
        let session = session.clone();
        let notifier = notifier.clone();
        tokio::spawn(async move {
            while let Some(text) = pending.recv().await {
                dispatcher.dispatch_text(&session, &notifier, &text).await;
            }
        })
    };

    let shutdown = gateway.shutdown_token().await;
    loop {
        let msg = tokio::select! {
            _ = shutdown.cancelled() => break,
            msg = ws_receiver.next() => msg,
        };
        match msg {
            Some(Ok(Message::Text(text))) => {
                let is_panic = matches!(Command::parse(&text), Ok(Command::Panic));
                if is_panic && session.is_authenticated() {
                    dispatcher.dispatch(&session, &notifier, Command::Panic).await;
                    continue;
                }
                match commands.try_send(text) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(session_id = %session_id, "Command queue full");
                        notifier.send(ServerFrame::error(&Error::Busy)).await;
                    }
                    Err(TrySendError::Closed(_)) => break,
                }
            }
            Some(Ok(Message::Binary(_))) => {
                let err = Error::InvalidFrame("binary frames are not supported".to_string());
                notifier.send(ServerFrame::error(&err)).await;
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::debug!(session_id = %session_id, "WebSocket receive failed: {}", e);
                break;
            }
        }
    }

    drop(commands);
    worker.abort();
    let _ = worker.await;

    dispatcher.teardown(&session, &notifier).await;
    gateway.sessions().remove(&session_id).await;
    drop(notifier);

    if tokio::time::timeout(Duration::from_secs(2), &mut writer)
        .await
        .is_err()
    {
        writer.abort();
    }
    tracing::info!(session_id = %session_id, "Client disconnected");
}

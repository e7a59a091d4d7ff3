//! HTTP/WebSocket surface of the relay.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use super::router::BroadcastRouter;
use super::session::RelaySession;
use crate::config::RelayConfig;
use crate::i18n::{LanguageConfig, LanguageRegistry};
use crate::protocol::{Participant, ServerFrame};

/// Build the relay's routes around a shared router.
pub fn create_router(router: Arc<BroadcastRouter>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_check))
        .route("/api/participants", get(list_participants))
        .route("/api/languages", get(list_languages))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(router)
}

/// Bind and serve until Ctrl+C.
pub async fn serve(config: &RelayConfig) -> Result<()> {
    let router = Arc::new(BroadcastRouter::new(config.router_options()));
    let app = create_router(router);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Relay listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Relay server failed")?;

    info!("Relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}

async fn health_check() -> &'static str {
    "OK"
}

async fn list_participants(State(router): State<Arc<BroadcastRouter>>) -> Json<Vec<Participant>> {
    Json(router.snapshot())
}

async fn list_languages() -> Json<&'static [LanguageConfig]> {
    Json(LanguageRegistry::get().list())
}

async fn ws_handler(ws: WebSocketUpgrade, State(router): State<Arc<BroadcastRouter>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, router))
}

async fn handle_socket(mut socket: WebSocket, router: Arc<BroadcastRouter>) {
    let mut session = RelaySession::open(router);

    if send_frame(&mut socket, &session.welcome()).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            outbound = session.next_outbound() => {
                match outbound {
                    Some(frame) => {
                        if send_frame(&mut socket, &frame).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = session.handle_text(&text) {
                            if send_frame(&mut socket, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        // A failed pong surfaces as a read error on the next poll
                        let _ = socket.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    debug!("Socket for {} finished", session.connection_id());
    // dropping the session deregisters the participant
}

async fn send_frame(socket: &mut WebSocket, frame: &ServerFrame) -> Result<(), axum::Error> {
    match serde_json::to_string(frame) {
        Ok(json) => socket.send(Message::Text(json)).await,
        // ServerFrame always serializes; nothing to send otherwise
        Err(_) => Ok(()),
    }
}

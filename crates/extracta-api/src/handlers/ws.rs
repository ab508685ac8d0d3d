//! Live progress over WebSocket.
//!
//! Clients connect to `/ws/<id>` and receive JSON-encoded progress events:
//! the current snapshot first, then every update for the job. The socket is
//! closed when the client disconnects, the server shuts down, or the client
//! falls too far behind and is evicted by the broadcaster.

use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tracing::{debug, info};

use extracta_core::defaults::WS_PING_INTERVAL_SECS;
use extracta_jobs::Subscription;

use super::parse_job_id;
use crate::{ApiError, AppState};

pub async fn job_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let job_id = parse_job_id(&id)?;
    // Subscribe before upgrading so unknown jobs get a plain 404.
    let subscription = state.orchestrator.subscribe(job_id)?;
    Ok(ws.on_upgrade(move |socket| handle_ws_connection(socket, subscription, state)))
}

async fn handle_ws_connection(socket: WebSocket, mut subscription: Subscription, state: AppState) {
    let job_id = subscription.job_id();
    let count = state.ws_connections.fetch_add(1, Ordering::Relaxed) + 1;
    info!(%job_id, active = count, "WebSocket connection opened");

    let (mut sender, mut receiver) = socket.split();
    let shutdown = state.orchestrator.shutdown_token();
    let mut ping_interval = tokio::time::interval(Duration::from_secs(WS_PING_INTERVAL_SECS));
    ping_interval.tick().await;

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else {
                    debug!(%job_id, "Subscription closed");
                    break;
                };
                match serde_json::to_string(&event) {
                    Ok(json) => {
                        if sender.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => debug!(%job_id, error = %e, "Could not encode progress event"),
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            _ = ping_interval.tick() => {
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }

    let _ = sender.send(Message::Close(None)).await;
    drop(subscription);
    let count = state.ws_connections.fetch_sub(1, Ordering::Relaxed) - 1;
    info!(%job_id, active = count, "WebSocket connection closed");
}

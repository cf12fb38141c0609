//! `GET /ws` — the WebSocket upgrade endpoint every sink connects to.
//!
//! Mirrors the split-task shape of a typical Axum audio WebSocket
//! handler: one task drains the sink's outbound channel to the wire,
//! another reads inbound frames and drives the sync/ready handshake.
//! The two share the same outbound channel sender, so a `sync_response`
//! queued by the ingress task and a broadcast `audio_chunk` queued by the
//! capture loop both funnel through the one egress task in send order.

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};

use airsync_protocol::{decode, encode, ClientReady, Message};

use crate::scheduler::SourceScheduler;

pub fn router(scheduler: Arc<SourceScheduler>) -> Router {
    Router::new().route("/ws", get(upgrade)).with_state(scheduler)
}

async fn upgrade(ws: WebSocketUpgrade, State(scheduler): State<Arc<SourceScheduler>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, scheduler))
}

async fn handle_connection(socket: WebSocket, scheduler: Arc<SourceScheduler>) {
    let (id, mut outbound_rx) = scheduler.register_sink().await;
    let (mut ws_sender, mut ws_receiver) = socket.split();

    if ws_sender.send(WsMessage::Binary(encode(&Message::ServerInfo(scheduler.server_info())).into())).await.is_err() {
        scheduler.unregister_sink(id).await;
        return;
    }

    let mut egress = tokio::spawn(async move {
        while let Some(bytes) = outbound_rx.recv().await {
            if ws_sender.send(WsMessage::Binary(bytes.into())).await.is_err() {
                break;
            }
        }
    });

    let ingress_scheduler = scheduler.clone();
    let mut ingress = tokio::spawn(async move {
        while let Some(frame) = ws_receiver.next().await {
            let data = match frame {
                Ok(WsMessage::Binary(data)) => data,
                Ok(WsMessage::Close(_)) | Err(_) => break,
                Ok(_) => continue,
            };
            let msg = match decode(&data) {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::warn!(sink = %id, error = %e, "dropping malformed frame");
                    continue;
                }
            };
            match msg {
                Message::SyncRequest(req) => {
                    let resp = ingress_scheduler.build_sync_response(&req);
                    ingress_scheduler.send_to(id, &Message::SyncResponse(resp)).await;
                }
                Message::ClientReady(ClientReady { client_id }) => {
                    tracing::info!(sink = %id, client_id = %client_id, "sink ready");
                    ingress_scheduler.mark_ready(id, client_id).await;
                }
                other => {
                    tracing::warn!(sink = %id, tag = other.tag(), "unexpected message from sink");
                }
            }
        }
    });

    tokio::select! {
        _ = &mut egress => { ingress.abort(); }
        _ = &mut ingress => { egress.abort(); }
    }

    scheduler.unregister_sink(id).await;
    tracing::info!(sink = %id, "sink disconnected");
}

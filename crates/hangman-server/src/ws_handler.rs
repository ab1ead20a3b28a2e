//! WebSocket handler for the hangman server.
//!
//! Each WebSocket connection follows this lifecycle:
//!
//! 1. Client sends `CreateRoom` or `JoinRoom`.
//! 2. On success the connection is bound to a room + client ID.
//! 3. Subsequent `ClientMessage`s are applied to that room under its mutex.
//! 4. On disconnect the member is removed and the room may be cleaned up.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use hangman_core::protocol::{ClientId, ClientMessage, ServerMessage};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::ActionError;
use crate::room::{PlayerRx, RoomManager, SharedRoom};

type WsSink = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// A connection that has joined a room.
struct Seat {
    room_id: String,
    client_id: ClientId,
    rx: PlayerRx,
    room: SharedRoom,
}

/// Drive a single WebSocket connection.
///
/// Called after the Axum upgrade; `socket` is the full-duplex WebSocket.
pub async fn handle_socket(socket: WebSocket, room_manager: Arc<RoomManager>) {
    let (ws_sink, mut ws_stream) = socket.split();
    let ws_sink: WsSink = Arc::new(Mutex::new(ws_sink));

    let Some(seat) = lobby(&mut ws_stream, &ws_sink, &room_manager).await else {
        return;
    };
    let Seat {
        room_id,
        client_id,
        mut rx,
        room,
    } = seat;

    // Spawn a write task that drains the member's mpsc receiver and forwards
    // messages as WebSocket text frames.
    let write_sink = Arc::clone(&ws_sink);
    let write_handle = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(_) => continue,
            };
            let mut sink = write_sink.lock().await;
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // ── Room loop ────────────────────────────────────────────────────────
    loop {
        match ws_stream.next().await {
            Some(Ok(Message::Text(text))) => {
                let msg: ClientMessage = match serde_json::from_str(&text) {
                    Ok(m) => m,
                    Err(e) => {
                        send_one(
                            &ws_sink,
                            &ServerMessage::Error {
                                message: format!("Invalid message: {e}"),
                            },
                        )
                        .await;
                        continue;
                    }
                };
                if matches!(msg, ClientMessage::Leave) {
                    break;
                }

                let result = room.lock().await.handle_client_message(client_id, msg);
                if let Err(ActionError::UnknownMember(_)) = result {
                    // Evicted after a failed delivery.
                    debug!(room = %room_id, client = client_id, "member no longer in room");
                    break;
                }
            }
            Some(Ok(Message::Close(_))) | None => break,
            _ => continue,
        }
    }

    // ── Cleanup ──────────────────────────────────────────────────────────
    write_handle.abort();
    room_manager.leave_room(&room, client_id).await;
    info!(room = %room_id, client = client_id, "client disconnected");
}

/// Wait for a `CreateRoom` / `JoinRoom` that binds the connection to a room.
/// Returns `None` if the socket closes first.
async fn lobby(
    ws_stream: &mut SplitStream<WebSocket>,
    ws_sink: &WsSink,
    room_manager: &RoomManager,
) -> Option<Seat> {
    loop {
        let text = match ws_stream.next().await {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => return None,
            _ => continue,
        };
        let msg: ClientMessage = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                let err = ServerMessage::Error {
                    message: format!("Invalid message: {e}"),
                };
                send_one(ws_sink, &err).await;
                continue;
            }
        };

        match msg {
            ClientMessage::CreateRoom { room_id } => {
                let reply = match room_manager.create_room(&room_id).await {
                    Ok(()) => ServerMessage::RoomCreated { room_id },
                    Err(e) => ServerMessage::RoomError {
                        message: e.to_string(),
                    },
                };
                send_one(ws_sink, &reply).await;
            }
            ClientMessage::JoinRoom {
                room_id,
                name,
                spectator,
            } => match room_manager.join_room(&room_id, &name, spectator).await {
                Ok((client_id, rx, room)) => {
                    return Some(Seat {
                        room_id,
                        client_id,
                        rx,
                        room,
                    });
                }
                Err(e) => {
                    let reply = ServerMessage::RoomError {
                        message: e.to_string(),
                    };
                    send_one(ws_sink, &reply).await;
                }
            },
            ClientMessage::Ping => {
                send_one(ws_sink, &ServerMessage::Pong).await;
            }
            _ => {
                send_one(
                    ws_sink,
                    &ServerMessage::Error {
                        message: "Must create or join a room first".to_string(),
                    },
                )
                .await;
            }
        }
    }
}

/// Send a single `ServerMessage` directly on the raw WebSocket sink
/// (used outside the member's mpsc channel: lobby replies and parse errors).
async fn send_one(sink: &WsSink, msg: &ServerMessage) {
    if let Ok(json) = serde_json::to_string(msg) {
        let mut s = sink.lock().await;
        let _ = s.send(Message::Text(json.into())).await;
    }
}

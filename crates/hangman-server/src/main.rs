//! Multi-room Axum hangman server.
//!
//! # Routes
//!
//! | Method | Path            | Description                              |
//! |--------|-----------------|------------------------------------------|
//! | `GET`  | `/ws`           | WebSocket upgrade for game connections   |
//! | `GET`  | `/api/rooms`    | List active rooms (JSON)                 |
//!
//! Settings come from the command line or environment; see `--help`.

mod config;
mod error;
mod room;
mod session;
mod timer;
mod ws_handler;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use config::ServerConfig;
use room::{RoomManager, RoomSummary};

/// Shared application state available to all handlers.
#[derive(Clone)]
struct AppState {
    room_manager: Arc<RoomManager>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();

    // Initialise tracing (respects RUST_LOG env var).
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = config.game_settings();
    tracing::info!(
        max_rounds = settings.max_rounds,
        turn_seconds = settings.turn_duration.as_secs(),
        round_seconds = settings.round_duration.map(|d| d.as_secs()),
        ready_seconds = settings.ready_duration.as_secs(),
        min_players = settings.min_players,
        words = settings.words.len(),
        "game settings"
    );

    let state = AppState {
        room_manager: Arc::new(RoomManager::new(settings)),
    };

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/rooms", get(rooms_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Hangman server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

/// `GET /ws`: upgrade to WebSocket and hand off to [`ws_handler::handle_socket`].
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_handler::handle_socket(socket, state.room_manager))
}

/// `GET /api/rooms`: return a JSON array of active rooms.
async fn rooms_handler(State(state): State<AppState>) -> Json<Vec<RoomSummary>> {
    Json(state.room_manager.list_rooms().await)
}

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::broadcast::FramePublisher;
use crate::frame::{LatestFrame, FRAME_CONTENT_TYPE};

pub struct AppState {
    pub latest: Arc<LatestFrame>,
    pub publisher: FramePublisher,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/latest.jpg", get(latest_jpg))
        .route("/ws", get(ws_upgrade))
        .route("/healthz", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(include_str!("../assets/index.html"))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// The current frame, or 404 while the pipeline has not produced one yet.
/// Absence of a frame is an expected startup condition, not a failure.
async fn latest_jpg(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.latest.snapshot().await {
        Some(frame) => (
            [(CONTENT_TYPE, FRAME_CONTENT_TYPE), (CACHE_CONTROL, "no-store")],
            frame,
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "no frame captured yet").into_response(),
    }
}

async fn ws_upgrade(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Forward every broadcast payload to the socket until the client leaves.
/// Incoming messages are drained and ignored; the channel is one-way.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut frames = state.publisher.subscribe();

    info!("viewer connected");

    let mut send_task = tokio::spawn(async move {
        loop {
            match frames.recv().await {
                Ok(payload) => {
                    if sender.send(Message::Text(payload)).await.is_err() {
                        break;
                    }
                }
                // Fell behind the live frame; the next recv returns it.
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "viewer lagged, skipping to newest frame");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    loop {
        tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "websocket receive error");
                    break;
                }
            },
            _ = &mut send_task => break,
        }
    }

    send_task.abort();
    info!("viewer disconnected");
}

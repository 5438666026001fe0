//! Web layer: axum HTTP + WebSocket access to the camera service.
//!
//! - `GET /api/latest-shot` — current preview image (503 until the first
//!   frame is published)
//! - `GET /api/latest-shot-metadata` — metadata for the current preview
//! - `GET /api/status` — connection state, degraded flag, counters
//! - `GET /api/conditions` — sky/environment readings
//! - `POST /api/reconnect` — operator-requested reconnect
//! - `WS /ws/feed` — every new preview frame, per viewer at its own pace

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

use crate::service::CameraService;

/// Build the API router over a service handle.
pub fn router(service: CameraService) -> Router {
    Router::new()
        .route("/api/latest-shot", get(latest_shot))
        .route("/api/latest-shot-metadata", get(latest_shot_metadata))
        .route("/api/status", get(api_status))
        .route("/api/conditions", get(api_conditions))
        .route("/api/reconnect", post(api_reconnect))
        .route("/ws/feed", get(ws_upgrade))
        .layer(CorsLayer::permissive())
        .with_state(service)
}

/// Bind and serve until the process exits.
pub async fn start(service: CameraService, bind: SocketAddr) -> Result<()> {
    let app = router(service);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind to {bind}"))?;

    info!("web server listening on http://{bind}");
    axum::serve(listener, app).await.context("Web server error")?;
    Ok(())
}

/// GET /api/latest-shot — current preview image bytes.
async fn latest_shot(State(service): State<CameraService>) -> impl IntoResponse {
    match service.latest_preview() {
        Some(frame) => (
            [(header::CONTENT_TYPE, "image/jpeg")],
            frame.image.clone(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "no shot captured yet").into_response(),
    }
}

/// GET /api/latest-shot-metadata — metadata of the current preview.
async fn latest_shot_metadata(State(service): State<CameraService>) -> impl IntoResponse {
    match service.latest_metadata() {
        Some(metadata) => Json(serde_json::Value::Object(metadata)).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "no shot captured yet").into_response(),
    }
}

/// GET /api/status — service status snapshot.
async fn api_status(State(service): State<CameraService>) -> Json<serde_json::Value> {
    let status = service.status().await;
    Json(serde_json::json!({
        "connection": status.connection.to_string(),
        "terminally_failed": status.terminally_failed,
        "frames_published": status.frames_published,
        "uptime_secs": status.uptime_secs,
    }))
}

/// GET /api/conditions — current sky/environment readings.
async fn api_conditions(State(service): State<CameraService>) -> Json<serde_json::Value> {
    Json(serde_json::Value::Object(service.conditions()))
}

/// POST /api/reconnect — tear down and rebuild the device connection.
async fn api_reconnect(State(service): State<CameraService>) -> Json<serde_json::Value> {
    let ok = service.force_reconnect().await;
    Json(serde_json::json!({
        "ok": ok,
        "terminal_failure": !ok,
    }))
}

/// WebSocket upgrade handler.
async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(service): State<CameraService>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, service))
}

/// Push every new preview to one viewer: a binary image message followed by
/// a text metadata message. A slow viewer skips frames instead of
/// back-pressuring the schedulers.
async fn handle_ws(socket: WebSocket, service: CameraService) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut sub = service.observe_feed();

    loop {
        tokio::select! {
            frame = sub.next() => {
                match frame {
                    Some(frame) => {
                        if ws_tx.send(Message::Binary(frame.image.clone())).await.is_err() {
                            break;
                        }
                        let metadata = serde_json::Value::Object(frame.metadata.clone()).to_string();
                        if ws_tx.send(Message::Text(metadata.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_tx.send(Message::Pong(data)).await;
                    }
                    Some(Err(_)) => break,
                    _ => {} // Ignore viewer text/binary
                }
            }
        }
    }

    debug!("feed viewer disconnected");
}

//! E2E regression suite for the allsky service.
//!
//! Two layers, no hardware (simulator driver throughout):
//!
//! - Scheduling scenarios on a paused clock: the full
//!   scheduler → gate → session → handler → feed pipeline with scripted
//!   captures and virtual time.
//! - Web scenarios over real sockets: an ephemeral-port axum server
//!   exercised with HTTP and WebSocket clients.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::json;
use tokio_tungstenite::tungstenite;

use allsky::codec::PreviewCodec;
use allsky::conditions::FixedConditions;
use allsky::config::parse_shot_configs;
use allsky::device::{CameraDriver, SimulatorDriver};
use allsky::feed::Metadata;
use allsky::{web, CameraService};

// ── Shared helpers ───────────────────────────────────────────────────

/// Codec that passes raw bytes through untouched, so tests can assert on
/// scripted payload identity.
struct RawCodec;

impl PreviewCodec for RawCodec {
    fn encode_preview(&self, raw: &Bytes) -> allsky::Result<(Bytes, Metadata)> {
        Ok((raw.clone(), Metadata::new()))
    }
}

fn build_service(
    sim: &Arc<SimulatorDriver>,
    codec: Arc<dyn PreviewCodec>,
    conditions: Arc<FixedConditions>,
    config: serde_json::Value,
    archive_dir: std::path::PathBuf,
) -> CameraService {
    let driver: Arc<dyn CameraDriver> = sim.clone();
    CameraService::new(driver, codec, conditions, parse_shot_configs(&config), archive_dir)
}

/// Start a web server on an ephemeral port, return the bound address.
async fn start_test_server(service: CameraService) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = web::router(service);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    addr
}

/// Connect a WebSocket viewer to the feed.
async fn connect_ws(
    addr: SocketAddr,
) -> tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>> {
    let url = format!("ws://{addr}/ws/feed");
    let (stream, _response) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("WebSocket connect failed");
    stream
}

/// Collect WebSocket messages until timeout.
async fn collect_ws_messages(
    ws: &mut tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    timeout: Duration,
) -> Vec<tungstenite::Message> {
    let mut messages = Vec::new();
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, ws.next()).await {
            Ok(Some(Ok(msg))) => messages.push(msg),
            Ok(Some(Err(_))) | Ok(None) => break,
            Err(_) => break, // Timeout
        }
    }
    messages
}

// ═══════════════════════════════════════════════════════════════════════
// Scheduling scenarios (paused clock)
// ═══════════════════════════════════════════════════════════════════════

/// Scripted captures flow through the whole pipeline on schedule: a
/// subscriber sees "A" then "B" with strictly increasing sequence numbers,
/// spaced one preview period apart.
#[tokio::test(start_paused = true)]
async fn preview_pipeline_publishes_on_schedule() {
    let dir = tempfile::tempdir().unwrap();
    let sim = Arc::new(SimulatorDriver::new());
    sim.script_payloads([Bytes::from_static(b"A"), Bytes::from_static(b"B")]);

    let service = build_service(
        &sim,
        Arc::new(RawCodec),
        Arc::new(FixedConditions::default()),
        json!({
            "preview": { "exposure_secs": 0.02, "gain": 30.0, "period_secs": 2.0, "enabled": true }
        }),
        dir.path().to_path_buf(),
    );
    service.connect().await.unwrap();

    let mut sub = service.observe_feed();
    let loops = service.spawn_shot_loops();

    let start = tokio::time::Instant::now();
    let first = sub.next().await.unwrap();
    let first_at = start.elapsed();
    let second = sub.next().await.unwrap();
    let second_at = start.elapsed();

    for handle in loops {
        handle.abort();
    }

    assert_eq!(first.image, Bytes::from_static(b"A"));
    assert_eq!(second.image, Bytes::from_static(b"B"));
    assert!(second.seq > first.seq);

    let gap = second_at - first_at;
    assert!(
        gap >= Duration::from_millis(1900) && gap <= Duration::from_millis(2100),
        "expected frames one period (~2s) apart, got {gap:?}"
    );
}

/// Archival captures are blocked in daylight unless overridden, and the
/// override takes effect on the next iteration after a config reload.
#[tokio::test(start_paused = true)]
async fn archive_gating_respects_sky_conditions() {
    let dir = tempfile::tempdir().unwrap();
    let sim = Arc::new(SimulatorDriver::new());
    let daylight = Arc::new(FixedConditions::new(false, false));

    let service = build_service(
        &sim,
        Arc::new(RawCodec),
        Arc::clone(&daylight),
        json!({
            "savetodisk": { "exposure_secs": 0.1, "period_secs": 2.0, "enabled": true }
        }),
        dir.path().to_path_buf(),
    );
    service.connect().await.unwrap();
    let loops = service.spawn_shot_loops();

    // Daylight, no override: nothing fires.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(sim.captures_started(), 0);

    // Operator override lands via config reload: captures start on the very
    // next probe.
    service.config_store().replace(parse_shot_configs(&json!({
        "savetodisk": {
            "exposure_secs": 0.1,
            "period_secs": 2.0,
            "enabled": true,
            "override_gating": true
        }
    })));
    tokio::time::sleep(Duration::from_secs(10)).await;

    for handle in loops {
        handle.abort();
    }

    assert!(sim.captures_started() >= 2, "override did not unblock archival captures");
    let archived = std::fs::read_dir(dir.path()).unwrap().count();
    assert!(archived >= 1, "no archive files written");
}

// ═══════════════════════════════════════════════════════════════════════
// Web scenarios (real sockets)
// ═══════════════════════════════════════════════════════════════════════

/// Before the first frame, image and metadata endpoints report 503 and the
/// status endpoint shows a disconnected device with zero frames.
#[tokio::test(flavor = "multi_thread")]
async fn api_unavailable_before_first_frame() {
    let dir = tempfile::tempdir().unwrap();
    let sim = Arc::new(SimulatorDriver::new());
    let service = build_service(
        &sim,
        Arc::new(RawCodec),
        Arc::new(FixedConditions::default()),
        json!({}),
        dir.path().to_path_buf(),
    );
    let addr = start_test_server(service).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://{addr}/api/latest-shot"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);

    let resp = client
        .get(format!("http://{addr}/api/latest-shot-metadata"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);

    let status: serde_json::Value = client
        .get(format!("http://{addr}/api/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["connection"], "disconnected");
    assert_eq!(status["frames_published"], 0);
    assert_eq!(status["terminally_failed"], false);

    let conditions: serde_json::Value = client
        .get(format!("http://{addr}/api/conditions"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(conditions["is_astronomical_night"], true);
}

/// Full pipeline over real sockets: the preview loop publishes, HTTP serves
/// the latest image and enriched metadata, and two independent WebSocket
/// viewers both receive frames.
#[tokio::test(flavor = "multi_thread")]
async fn preview_flows_to_http_and_websocket_viewers() {
    let dir = tempfile::tempdir().unwrap();
    let sim = Arc::new(SimulatorDriver::new());
    let service = build_service(
        &sim,
        Arc::new(RawCodec),
        Arc::new(FixedConditions::default()),
        json!({
            "preview": { "exposure_secs": 0.01, "gain": 10.0, "period_secs": 1.0, "enabled": true }
        }),
        dir.path().to_path_buf(),
    );
    service.connect().await.unwrap();
    let addr = start_test_server(service.clone()).await;

    let mut viewer_a = connect_ws(addr).await;
    let mut viewer_b = connect_ws(addr).await;

    let loops = service.spawn_shot_loops();

    let messages_a = collect_ws_messages(&mut viewer_a, Duration::from_millis(2500)).await;
    let messages_b = collect_ws_messages(&mut viewer_b, Duration::from_millis(2500)).await;

    for viewers in [&messages_a, &messages_b] {
        let binary = viewers
            .iter()
            .filter(|m| matches!(m, tungstenite::Message::Binary(_)))
            .count();
        let text = viewers
            .iter()
            .filter(|m| matches!(m, tungstenite::Message::Text(_)))
            .count();
        assert!(binary >= 1, "viewer received no image frames");
        assert!(text >= 1, "viewer received no metadata");
    }

    // Metadata messages carry the enrichment fields.
    let metadata_text = messages_a
        .iter()
        .find_map(|m| match m {
            tungstenite::Message::Text(t) => Some(t.to_string()),
            _ => None,
        })
        .unwrap();
    let metadata: serde_json::Value = serde_json::from_str(&metadata_text).unwrap();
    assert!(metadata["shot_utc"].is_string());
    assert_eq!(metadata["period_secs"], 1.0);
    assert_eq!(metadata["conditions"]["is_moonless"], true);

    // HTTP sees the same latest frame.
    let client = reqwest::Client::new();
    let resp = client
        .get(format!("http://{addr}/api/latest-shot"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "image/jpeg");
    assert!(!resp.bytes().await.unwrap().is_empty());

    let status: serde_json::Value = client
        .get(format!("http://{addr}/api/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["connection"], "connected");
    assert!(status["frames_published"].as_u64().unwrap() >= 1);

    for handle in loops {
        handle.abort();
    }
    viewer_a.close(None).await.ok();
    viewer_b.close(None).await.ok();
}

/// A dead device drives the service into terminal failure; the API surfaces
/// it and a forced reconnect cannot clear it.
#[tokio::test(flavor = "multi_thread")]
async fn terminal_failure_is_surfaced_and_absorbing() {
    let dir = tempfile::tempdir().unwrap();
    let sim = Arc::new(SimulatorDriver::new());
    let service = build_service(
        &sim,
        Arc::new(RawCodec),
        Arc::new(FixedConditions::default()),
        json!({
            "testing": { "exposure_secs": 0.05, "period_secs": 1.0, "enabled": true }
        }),
        dir.path().to_path_buf(),
    );
    service.connect().await.unwrap();

    // Every exposure faults and the device refuses reconnects: the first
    // failure report drives the session into terminal failure.
    sim.fail_exposures(true);
    sim.refuse_connections(true);
    let loops = service.spawn_shot_loops();

    let addr = start_test_server(service.clone()).await;
    let client = reqwest::Client::new();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if service.is_terminally_failed().await {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "service never reached terminal failure"
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let status: serde_json::Value = client
        .get(format!("http://{addr}/api/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["connection"], "terminal-failure");
    assert_eq!(status["terminally_failed"], true);

    // The device coming back does not matter: terminal is absorbing, even
    // for operator-forced reconnects.
    sim.refuse_connections(false);
    let resp: serde_json::Value = client
        .post(format!("http://{addr}/api/reconnect"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["terminal_failure"], true);
    assert!(service.is_terminally_failed().await);

    for handle in loops {
        handle.abort();
    }
}

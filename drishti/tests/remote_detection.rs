use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use drishti::core_modules::capture::{Frame, StillImageSource};
use drishti::core_modules::detection::{
    DetectionAdapter, DetectionError, DetectionOutcome, DetectionService,
};
use drishti::core_modules::local_detector::LocalDetector;
use drishti::core_modules::remote_detector::RemoteDetector;
use drishti::core_modules::sink::TracingSink;
use drishti::{DetectionConfig, DetectionMode, Monitor, MonitorConfig};
use image::{Rgb, RgbImage};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

async fn detect(Json(body): Json<Value>) -> Result<Json<Value>, (StatusCode, String)> {
    let image = body["image"].as_str().unwrap_or_default();
    let payload = image
        .strip_prefix("data:image/jpeg;base64,")
        .ok_or((StatusCode::BAD_REQUEST, "expected a jpeg data uri".to_string()))?;
    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    image::load_from_memory(&bytes).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    Ok(Json(json!({
        "threatLevel": 85.0,
        "violence": false,
        "weapons": [{"name": "Knife", "confidence": 0.72, "box": [4, 4, 20, 30]}],
        "people": 2,
        "male": 1,
        "female": 1,
        "detections": []
    })))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "models_loaded": true,
        "models": {"cnn": true, "lstm": true, "gender": false, "yolo": true, "face": true}
    }))
}

async fn spawn_service() -> String {
    let app = Router::new()
        .route("/api/detect", post(detect))
        .route("/api/health", get(health))
        .route("/api/broken", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
        .route("/api/garbled", post(|| async { "<html>definitely not json</html>" }));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn frame() -> Frame {
    let image = RgbImage::from_pixel(32, 24, Rgb([90, 120, 150]));
    Frame::new(Arc::new(image), 0)
}

fn detector(url: &str) -> RemoteDetector {
    RemoteDetector::new(url, 80, Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn submits_jpeg_and_parses_response() {
    let base = spawn_service().await;
    let remote = detector(&format!("{base}/api/detect"));

    let result = remote.detect(frame()).await.unwrap();
    assert_eq!(result.threat_level, 85.0);
    assert_eq!(result.people_count, Some(2));
    assert_eq!(result.weapons_detected.len(), 1);
    assert_eq!(result.weapons_detected[0].name, "Knife");
    assert_eq!(result.weapons_detected[0].confidence, Some(0.72));
}

#[tokio::test]
async fn health_probe_reads_model_inventory() {
    let base = spawn_service().await;
    let report = detector(&format!("{base}/api/detect")).health().await.unwrap();
    assert_eq!(report.status, "ok");
    assert!(report.models_loaded);
    assert!(report.models.yolo);
    assert!(!report.models.gender);
}

#[tokio::test]
async fn server_error_falls_back_to_local() {
    let base = spawn_service().await;
    let remote = Arc::new(detector(&format!("{base}/api/broken")));
    let adapter = DetectionAdapter::remote(remote, LocalDetector::seeded(3));

    match adapter.cycle(frame()).await {
        DetectionOutcome::Local {
            fallback: Some(DetectionError::Status { status }),
            result,
        } => {
            assert_eq!(status.as_u16(), 500);
            assert!((0.0..100.0).contains(&result.threat_level));
        }
        other => panic!("expected a local fallback, got {other:?}"),
    }
}

#[tokio::test]
async fn garbled_body_is_malformed() {
    let base = spawn_service().await;
    let remote = detector(&format!("{base}/api/garbled"));
    assert!(matches!(
        remote.detect(frame()).await,
        Err(DetectionError::Malformed(_))
    ));
}

#[tokio::test]
async fn unreachable_service_is_a_transport_failure() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let remote = Arc::new(detector(&format!("http://{addr}/api/detect")));
    let adapter = DetectionAdapter::remote(remote, LocalDetector::seeded(5));
    let outcome = adapter.cycle(frame()).await;
    assert!(matches!(
        outcome,
        DetectionOutcome::Local {
            fallback: Some(DetectionError::Transport(_)),
            ..
        }
    ));
}

#[tokio::test]
async fn monitor_applies_remote_results() {
    let base = spawn_service().await;
    let config = MonitorConfig {
        sample_interval_ms: 5,
        frame_period_ms: 1,
        detection: DetectionConfig {
            mode: DetectionMode::Remote,
            endpoint: format!("{base}/api/detect"),
            ..DetectionConfig::default()
        },
        ..MonitorConfig::default()
    };
    let mut monitor = Monitor::new(config, Arc::new(TracingSink)).unwrap();
    let source = StillImageSource::from_image(RgbImage::from_pixel(32, 24, Rgb([1, 2, 3])));
    monitor.start(Box::new(source)).unwrap();

    timeout(Duration::from_secs(5), async {
        while monitor.counters().map(|c| c.applied).unwrap_or(0) < 2 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("remote cycles were not applied in time");

    let stats = monitor.stats().unwrap();
    assert_eq!(stats.last_threat_level, 85);
    assert_eq!(stats.last_people_count, 2);
    assert!(stats.weapons >= 2);
    assert_eq!(monitor.counters().unwrap().fallbacks, 0);
    monitor.stop();
}

//! End-to-end tests for the scan workflow.
//!
//! Drives `ScanOrchestrator` with a still-image camera against a mock scan
//! service and checks what actually goes over the wire.

use base64::{engine::general_purpose::STANDARD, Engine};
use mark_scanner::camera::{Camera, CameraError, CameraSettings, Frame, Resolution, StillCamera};
use mark_scanner::orchestrator::Stable;
use mark_scanner::remote::{GridParams, RetryPolicy, ScanClient, ScanMode, DEFAULT_CROP_PATH, DEFAULT_GRID_PATH};
use mark_scanner::{DisplayRect, DisplaySize, ScanError, ScanOrchestrator, ScanState, SpreadsheetArtifact};
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct DeniedCamera;

impl Camera for DeniedCamera {
    fn open(&mut self, _settings: &CameraSettings) -> Result<Resolution, CameraError> {
        Err(CameraError::PermissionDenied("camera access was denied".to_string()))
    }
    fn latest_frame(&self) -> Result<Frame, CameraError> {
        Err(CameraError::NotOpen)
    }
    fn close(&mut self) {}
    fn is_open(&self) -> bool {
        false
    }
    fn describe(&self) -> String {
        "denied".to_string()
    }
}

fn still_camera() -> Box<dyn Camera> {
    let (width, height) = (40u32, 20u32);
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            data.extend_from_slice(&[(x * 6) as u8, (y * 12) as u8, 90]);
        }
    }
    Box::new(StillCamera::from_frame(Frame::new(data, width, height)))
}

fn orchestrator(dir: &TempDir) -> ScanOrchestrator {
    let artifact = SpreadsheetArtifact::new(dir.path().join("handles"), "marks.xlsx");
    ScanOrchestrator::enter(
        still_camera(),
        &CameraSettings::default(),
        artifact,
        GridParams::default(),
    )
}

fn client(server: &MockServer) -> ScanClient {
    ScanClient::new(server.uri())
        .expect("Failed to create client")
        .with_retry(RetryPolicy::none())
}

fn success(marks: &[f64], total: f64, artifact: &[u8]) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "marks": marks,
        "total": total,
        "artifact": STANDARD.encode(artifact),
    }))
}

fn decode_png(bytes: &[u8]) -> (u32, u32) {
    let image = image::load_from_memory(bytes).expect("request image should be a PNG");
    (image.width(), image.height())
}

// =============================================================================
// Auto mode
// =============================================================================

#[tokio::test]
async fn test_auto_scan_sends_full_frame_and_stores_artifact() {
    let dir = TempDir::new().unwrap();
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(DEFAULT_GRID_PATH))
        .and(body_partial_json(serde_json::json!({"rows": 4, "cols": 2})))
        .respond_with(success(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0], 36.0, b"workbook-1"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut orch = orchestrator(&dir);
    assert!(orch.submit(&client(&mock_server)).await);

    assert_eq!(orch.state(), &ScanState::Idle);
    assert_eq!(orch.artifact().bytes(), Some(&b"workbook-1"[..]));
    assert_eq!(
        orch.last_summary(),
        Some("Added row. Marks: [1, 2, 3, 4, 5, 6, 7, 8], Total: 36")
    );

    let handle = orch.artifact().download_handle().expect("handle issued");
    assert_eq!(std::fs::read(handle.path()).unwrap(), b"workbook-1");

    let received = mock_server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert!(body.get("artifact").is_none());
    let png = STANDARD.decode(body["image"].as_str().unwrap()).unwrap();
    assert_eq!(decode_png(&png), (40, 20));
}

#[tokio::test]
async fn test_artifact_threads_through_consecutive_scans() {
    let dir = TempDir::new().unwrap();
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({
            "artifact": STANDARD.encode(b"workbook-1")
        })))
        .respond_with(success(&[4.0], 4.0, b"workbook-2"))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .respond_with(success(&[3.0], 3.0, b"workbook-1"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client(&mock_server);
    let mut orch = orchestrator(&dir);
    assert!(orch.submit(&client).await);
    let first_handle = orch.artifact().download_handle().unwrap().path().to_path_buf();

    assert!(orch.submit(&client).await);
    assert_eq!(orch.artifact().bytes(), Some(&b"workbook-2"[..]));
    assert_eq!(orch.artifact().generation(), 2);
    assert!(!first_handle.exists(), "superseded handle should be revoked");
}

#[tokio::test]
async fn test_uploaded_spreadsheet_is_sent_with_first_scan() {
    let dir = TempDir::new().unwrap();
    let upload = dir.path().join("class.xlsx");
    std::fs::write(&upload, b"class-workbook").unwrap();
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({
            "artifact": STANDARD.encode(b"class-workbook")
        })))
        .respond_with(success(&[9.0], 9.0, b"class-workbook-2"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut orch = orchestrator(&dir);
    orch.upload_artifact(&upload);
    assert_eq!(orch.take_info().as_deref(), Some("Loaded custom spreadsheet class.xlsx."));
    assert!(orch.submit(&client(&mock_server)).await);
    assert_eq!(orch.artifact().filename(), "class.xlsx");
}

#[tokio::test]
async fn test_second_begin_submit_while_in_flight_is_noop() {
    let dir = TempDir::new().unwrap();
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(success(&[1.0], 1.0, b"once"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client(&mock_server);
    let mut orch = orchestrator(&dir);
    let pending = orch.begin_submit().expect("first submit starts");
    assert!(orch.is_submitting());
    assert!(orch.begin_submit().is_none());
    assert!(!orch.submit(&client).await);

    let outcome = client.scan_with_retry(pending.request()).await;
    orch.complete(pending, outcome);
    assert_eq!(orch.state(), &ScanState::Idle);
    assert_eq!(orch.artifact().bytes(), Some(&b"once"[..]));
}

// =============================================================================
// Manual mode
// =============================================================================

#[tokio::test]
async fn test_manual_scan_sends_scaled_crop() {
    let dir = TempDir::new().unwrap();
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(DEFAULT_CROP_PATH))
        .respond_with(success(&[6.0], 6.0, b"crop-workbook"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut orch = orchestrator(&dir);
    orch.set_mode(ScanMode::Manual);
    orch.capture();
    assert_eq!(orch.state(), &ScanState::Captured);
    orch.set_display_size(DisplaySize::new(20.0, 10.0));
    orch.set_selection(DisplayRect::new(1.0, 1.0, 5.0, 4.0));

    assert!(orch.submit(&client(&mock_server)).await);
    assert_eq!(orch.state(), &ScanState::Idle);
    assert!(orch.captured_frame().is_none());
    assert!(orch.selection().is_none());

    let received = mock_server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert!(body.get("rows").is_none());
    let png = STANDARD.decode(body["image"].as_str().unwrap()).unwrap();
    assert_eq!(decode_png(&png), (10, 8));
}

#[tokio::test]
async fn test_zero_width_selection_sends_nothing() {
    let dir = TempDir::new().unwrap();
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(success(&[1.0], 1.0, b"never"))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut orch = orchestrator(&dir);
    orch.set_mode(ScanMode::Manual);
    orch.capture();
    orch.set_display_size(DisplaySize::new(20.0, 10.0));
    orch.set_selection(DisplayRect::new(10.0, 10.0, 0.0, 40.0));

    assert!(!orch.submit(&client(&mock_server)).await);
    assert!(matches!(
        orch.state(),
        ScanState::Error {
            error: ScanError::Validation(_),
            from: Stable::Captured
        }
    ));
    assert!(orch.captured_frame().is_some());
}

#[tokio::test]
async fn test_manual_failure_keeps_still_for_resubmit() {
    let dir = TempDir::new().unwrap();
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(422)
                .set_body_json(serde_json::json!({"detail": "Crop contains no digits"})),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .respond_with(success(&[2.0], 2.0, b"recovered"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client(&mock_server);
    let mut orch = orchestrator(&dir);
    orch.set_mode(ScanMode::Manual);
    orch.capture();
    orch.set_display_size(DisplaySize::new(20.0, 10.0));
    orch.set_selection(DisplayRect::new(0.0, 0.0, 10.0, 5.0));

    assert!(orch.submit(&client).await);
    assert_eq!(
        orch.error(),
        Some(&ScanError::Remote("Crop contains no digits".to_string()))
    );
    assert!(orch.captured_frame().is_some());
    assert!(orch.artifact().bytes().is_none());

    assert!(orch.submit(&client).await);
    assert_eq!(orch.state(), &ScanState::Idle);
    assert_eq!(orch.artifact().bytes(), Some(&b"recovered"[..]));
}

#[tokio::test]
async fn test_mode_switch_keeps_artifact() {
    let dir = TempDir::new().unwrap();
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(success(&[1.0], 1.0, b"kept"))
        .mount(&mock_server)
        .await;

    let mut orch = orchestrator(&dir);
    assert!(orch.submit(&client(&mock_server)).await);

    orch.set_mode(ScanMode::Manual);
    orch.capture();
    orch.set_mode(ScanMode::Auto);

    assert_eq!(orch.state(), &ScanState::Idle);
    assert!(orch.captured_frame().is_none());
    assert_eq!(orch.artifact().bytes(), Some(&b"kept"[..]));
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_bad_artifact_payload_leaves_previous_artifact() {
    let dir = TempDir::new().unwrap();
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(success(&[1.0], 1.0, b"good"))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "marks": [1],
            "total": 1,
            "artifact": "%%%"
        })))
        .mount(&mock_server)
        .await;

    let client = client(&mock_server);
    let mut orch = orchestrator(&dir);
    assert!(orch.submit(&client).await);
    assert!(orch.submit(&client).await);

    assert!(matches!(orch.error(), Some(ScanError::Decode(_))));
    assert_eq!(orch.artifact().bytes(), Some(&b"good"[..]));
}

#[tokio::test]
async fn test_permission_denied_blocks_scanning() {
    let dir = TempDir::new().unwrap();
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(success(&[1.0], 1.0, b"never"))
        .expect(0)
        .mount(&mock_server)
        .await;

    let artifact = SpreadsheetArtifact::new(dir.path().to_path_buf(), "marks.xlsx");
    let mut orch = ScanOrchestrator::enter(
        Box::new(DeniedCamera),
        &CameraSettings::default(),
        artifact,
        GridParams::default(),
    );

    assert!(!orch.has_camera());
    assert!(matches!(
        orch.state(),
        ScanState::DeviceUnavailable(ScanError::DeviceAccess(_))
    ));
    assert!(!orch.submit(&client(&mock_server)).await);

    orch.acquire(still_camera(), &CameraSettings::default());
    assert_eq!(orch.state(), &ScanState::Idle);
    assert!(orch.has_camera());
}

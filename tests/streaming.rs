//! End-to-end tests against the service facade with the simulated driver

use std::time::Duration;

use argus::camera::driver::{ControlValue, ControlsMap};
use argus::camera::simulated::SimHandle;
use argus::camera::SimulatedCamera;
use argus::error::ServiceError;
use argus::modes::CameraMode;
use argus::service::CameraService;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn service() -> (CameraService, SimHandle) {
    let driver = SimulatedCamera::with_frame_interval(Duration::from_millis(5));
    let handle = driver.handle();
    let service = CameraService::new(
        Box::new(driver),
        ControlsMap::new(),
        "127.0.0.1:0".parse().unwrap(),
    )
    .unwrap();
    (service, handle)
}

async fn connect(service: &CameraService, path: &str) -> TcpStream {
    let addr = service.stream_addr().await.expect("listener not bound");
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n").as_bytes())
        .await
        .unwrap();
    stream
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Read until `needle` shows up (or the peer closes), bounded by `WAIT`
async fn read_until(stream: &mut TcpStream, needle: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    timeout(WAIT, async {
        let mut chunk = [0u8; 4096];
        loop {
            if contains(&buf, needle) {
                break;
            }
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
    })
    .await
    .expect("timed out waiting for stream data");
    buf
}

fn count_occurrences(haystack: &[u8], needle: &[u8]) -> usize {
    haystack.windows(needle.len()).filter(|w| *w == needle).count()
}

/// Sequence numbers the simulator embeds right after each SOI marker
fn frame_sequences(buf: &[u8]) -> Vec<u64> {
    let mut sequences = Vec::new();
    let mut i = 0;
    while i + 10 <= buf.len() {
        if buf[i] == 0xFF && buf[i + 1] == 0xD8 {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&buf[i + 2..i + 10]);
            sequences.push(u64::from_be_bytes(raw));
            i += 10;
        } else {
            i += 1;
        }
    }
    sequences
}

fn first_content_length(buf: &[u8]) -> Option<usize> {
    let text = String::from_utf8_lossy(buf);
    let start = text.find("Content-Length: ")? + "Content-Length: ".len();
    let digits: String = text[start..].chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[tokio::test]
async fn still_capture_returns_configured_resolution() {
    let (service, _) = service();

    let result = service.capture(None).await.unwrap();
    assert_eq!(result.width, 3280);
    assert_eq!(result.height, 2464);
    assert_eq!(result.pixels.len(), 3280 * 2464 * 3);
    assert!(!result.metadata.is_empty());
}

#[tokio::test]
async fn stream_serves_multipart_frames() {
    let (service, _) = service();
    service.start_preview(ControlsMap::new()).await.unwrap();

    let mut client = connect(&service, "/stream.mjpg").await;
    // Two boundaries guarantee one complete part in the buffer
    let mut buf = read_until(&mut client, b"--FRAME").await;
    buf.extend(read_until(&mut client, b"--FRAME").await);

    assert!(contains(&buf, b"HTTP/1.1 200 OK"));
    assert!(contains(
        &buf,
        b"Content-Type: multipart/x-mixed-replace; boundary=FRAME"
    ));
    assert!(contains(&buf, b"--FRAME\r\nContent-Type: image/jpeg\r\n"));
    assert!(first_content_length(&buf).unwrap() > 0);

    service.shutdown().await;
}

#[tokio::test]
async fn unknown_path_gets_404() {
    let (service, _) = service();
    service.start_preview(ControlsMap::new()).await.unwrap();

    let mut client = connect(&service, "/snapshot.jpg").await;
    let buf = read_until(&mut client, b"404").await;
    assert!(contains(&buf, b"HTTP/1.1 404 Not Found"));

    service.shutdown().await;
}

#[tokio::test]
async fn stream_path_answers_not_active_outside_preview() {
    let (service, _) = service();
    service.start_preview(ControlsMap::new()).await.unwrap();
    service.stop_preview(ControlsMap::new()).await.unwrap();

    // Listener survives stop_preview and answers instead of hanging
    let mut client = connect(&service, "/stream.mjpg").await;
    let buf = read_until(&mut client, b"stream not active").await;
    assert!(contains(&buf, b"HTTP/1.1 503 Service Unavailable"));

    service.shutdown().await;
}

#[tokio::test]
async fn concurrent_clients_progress_independently() {
    let (service, _) = service();
    service.start_preview(ControlsMap::new()).await.unwrap();

    let mut first = connect(&service, "/stream.mjpg").await;
    let mut second = connect(&service, "/stream.mjpg").await;

    let buf_first = read_until(&mut first, b"\xFF\xD9").await;
    let mut buf_second = read_until(&mut second, b"\xFF\xD9").await;
    assert!(!frame_sequences(&buf_first).is_empty());

    // Dropping one client must not interrupt delivery to the other
    drop(first);
    for _ in 0..3 {
        buf_second.extend(read_until(&mut second, b"\xFF\xD9").await);
    }

    let sequences = frame_sequences(&buf_second);
    assert!(sequences.len() >= 3);
    assert!(
        sequences.windows(2).all(|w| w[0] < w[1]),
        "sequences not monotonically increasing: {sequences:?}"
    );

    service.shutdown().await;
}

#[tokio::test]
async fn stop_preview_closes_sessions_and_restores_capture() {
    let (service, _) = service();
    service.start_preview(ControlsMap::new()).await.unwrap();

    let mut client = connect(&service, "/stream.mjpg").await;
    read_until(&mut client, b"--FRAME").await;

    service.stop_preview(ControlsMap::new()).await.unwrap();

    // The session ends cleanly: the socket reaches EOF in bounded time
    timeout(WAIT, async {
        let mut sink = [0u8; 4096];
        loop {
            if client.read(&mut sink).await.unwrap() == 0 {
                break;
            }
        }
    })
    .await
    .expect("session did not close after stop_preview");

    assert_eq!(service.mode().await, CameraMode::StillConfigured);
    assert!(service.capture(None).await.is_ok());
}

#[tokio::test]
async fn restarting_preview_reuses_the_listener() {
    let (service, _) = service();
    service.start_preview(ControlsMap::new()).await.unwrap();
    let addr = service.stream_addr().await.unwrap();

    service.stop_preview(ControlsMap::new()).await.unwrap();
    service.start_preview(ControlsMap::new()).await.unwrap();
    assert_eq!(service.stream_addr().await, Some(addr));

    let mut client = connect(&service, "/stream.mjpg").await;
    let buf = read_until(&mut client, b"--FRAME").await;
    assert!(contains(&buf, b"HTTP/1.1 200 OK"));
    assert!(count_occurrences(&buf, b"HTTP/1.1") == 1);

    service.shutdown().await;
}

#[tokio::test]
async fn occupied_port_rolls_back_to_still() {
    // Hold the port so the stream listener cannot bind it
    let occupant = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = occupant.local_addr().unwrap();

    let driver = SimulatedCamera::with_frame_interval(Duration::from_millis(5));
    let service = CameraService::new(Box::new(driver), ControlsMap::new(), addr).unwrap();

    let err = service.start_preview(ControlsMap::new()).await.unwrap_err();
    assert!(matches!(err, ServiceError::ListenerBind(_)));

    // The failed transition leaves the camera ready for stills
    assert_eq!(service.mode().await, CameraMode::StillConfigured);
    assert!(service.capture(None).await.is_ok());
}

#[tokio::test]
async fn silent_client_is_disconnected() {
    let (service, _) = service();
    service.start_preview(ControlsMap::new()).await.unwrap();

    // Connect but never send a request; the server must hang up on its
    // own rather than hold the session open.
    let addr = service.stream_addr().await.unwrap();
    let mut client = TcpStream::connect(addr).await.unwrap();

    timeout(WAIT, async {
        let mut sink = [0u8; 256];
        loop {
            if client.read(&mut sink).await.unwrap() == 0 {
                break;
            }
        }
    })
    .await
    .expect("silent connection was never closed");

    service.shutdown().await;
}

#[tokio::test]
async fn controls_round_trip_through_the_driver_echo() {
    let (service, _) = service();

    let mut controls = ControlsMap::new();
    controls.insert("ExposureTime".into(), ControlValue::Int(10_000));
    service.set_controls(controls).await.unwrap();

    let echoed = service.controls().await.unwrap();
    assert_eq!(echoed.get("ExposureTime"), Some(&ControlValue::Int(10_000)));
}

#[tokio::test]
async fn sync_status_reflects_driver_metadata() {
    let (service, handle) = service();

    handle.set_sync(false, 2_000);
    let status = service.sync_status().await.unwrap();
    assert!(!status.ready);
    assert_eq!(status.timer_us, 2_000);

    handle.set_sync(true, 0);
    let status = service.sync_status().await.unwrap();
    assert!(status.ready);
}

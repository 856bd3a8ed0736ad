//! Service facade
//!
//! One `CameraService` instance is constructed at startup with an
//! injected driver and lives for the process. The controller sits behind
//! a single async mutex: that lock is the mutual-exclusion region for
//! the driver handle, serializing capture and mode transitions while
//! frame distribution runs outside it.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::camera::driver::{CameraDriver, ControlsMap};
use crate::camera::{CaptureResult, SyncStatus};
use crate::error::ServiceError;
use crate::modes::{CameraMode, ModeController};

#[derive(Clone)]
pub struct CameraService {
    inner: Arc<Mutex<ModeController>>,
}

impl CameraService {
    /// Bring the camera up in still mode, mirroring power-on behavior.
    pub fn new(
        driver: Box<dyn CameraDriver>,
        still_controls: ControlsMap,
        stream_addr: SocketAddr,
    ) -> Result<Self, ServiceError> {
        let mut controller = ModeController::new(driver, stream_addr);
        controller.configure_still(still_controls)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(controller)),
        })
    }

    pub async fn capture(&self, flush_timestamp: Option<u64>) -> Result<CaptureResult, ServiceError> {
        self.inner.lock().await.capture(flush_timestamp)
    }

    pub async fn sync_status(&self) -> Result<SyncStatus, ServiceError> {
        self.inner.lock().await.sync_status()
    }

    pub async fn start_preview(&self, video_controls: ControlsMap) -> Result<(), ServiceError> {
        self.inner.lock().await.start_preview(video_controls).await
    }

    pub async fn stop_preview(&self, still_controls: ControlsMap) -> Result<(), ServiceError> {
        self.inner.lock().await.stop_preview(still_controls)
    }

    pub async fn set_controls(&self, controls: ControlsMap) -> Result<(), ServiceError> {
        self.inner.lock().await.set_controls(&controls)
    }

    pub async fn controls(&self) -> Result<ControlsMap, ServiceError> {
        self.inner.lock().await.controls()
    }

    pub async fn mode(&self) -> CameraMode {
        self.inner.lock().await.mode()
    }

    /// Address of the stream listener once a preview has started
    pub async fn stream_addr(&self) -> Option<SocketAddr> {
        self.inner.lock().await.stream_addr()
    }

    /// Orderly release of streaming, listener and driver resources
    pub async fn shutdown(&self) {
        self.inner.lock().await.shutdown();
    }
}

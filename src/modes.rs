//! Camera mode state machine
//!
//! Owns the driver handle and guarantees the core invariant of the
//! service: still-capture resources and streaming resources never exist
//! at the same time. Every driver operation goes through this type; the
//! facade serializes access to it, so the driver only ever sees one call
//! at a time.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::camera::driver::{CameraDriver, CameraProfile, ControlsMap, DriverRequest};
use crate::camera::sync::{self, SyncStatus};
use crate::camera::CaptureResult;
use crate::error::{DriverError, ServiceError};
use crate::stream::{FrameSlot, StreamServer};
use crate::CONFIG;

/// Mutually exclusive operating state of the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraMode {
    /// No sensor configuration applied
    Idle,
    /// Still profile applied, capture requests allowed
    StillConfigured,
    /// Video profile applied, encoder feeding the frame slot
    Streaming,
}

pub struct ModeController {
    driver: Box<dyn CameraDriver>,
    mode: CameraMode,
    slot: FrameSlot,
    /// Created on the first preview and kept across stop_preview; only
    /// its ability to serve frames is suspended.
    server: Option<StreamServer>,
    stream_addr: SocketAddr,
}

impl ModeController {
    pub fn new(driver: Box<dyn CameraDriver>, stream_addr: SocketAddr) -> Self {
        Self {
            driver,
            mode: CameraMode::Idle,
            slot: FrameSlot::new(),
            server: None,
            stream_addr,
        }
    }

    pub fn mode(&self) -> CameraMode {
        self.mode
    }

    /// Address of the stream listener once it exists
    pub fn stream_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(|s| s.local_addr())
    }

    fn expect(&self, wanted: CameraMode) -> Result<(), ServiceError> {
        if self.mode == wanted {
            Ok(())
        } else {
            Err(ServiceError::InvalidMode { mode: self.mode })
        }
    }

    fn apply_profile(&mut self, profile: &CameraProfile) -> Result<(), DriverError> {
        self.driver.stop()?;
        self.driver.configure(profile)?;
        self.driver.start()
    }

    /// Best-effort rollback after a failed transition: the prior still
    /// mode if the driver cooperates, Idle otherwise.
    fn recover_to_still(&mut self) {
        let profile = CameraProfile::from_config(&CONFIG.load().still, ControlsMap::new());
        match self.apply_profile(&profile) {
            Ok(()) => self.mode = CameraMode::StillConfigured,
            Err(e) => {
                error!(error = %e, "rollback to still mode failed, camera is idle");
                let _ = self.driver.stop();
                self.mode = CameraMode::Idle;
            }
        }
    }

    /// Apply the still profile and enter StillConfigured. Valid from
    /// Idle (power-on) and from StillConfigured (control refresh).
    pub fn configure_still(&mut self, controls: ControlsMap) -> Result<(), ServiceError> {
        if self.mode == CameraMode::Streaming {
            return Err(ServiceError::InvalidMode { mode: self.mode });
        }
        let profile = CameraProfile::from_config(&CONFIG.load().still, controls);
        match self.apply_profile(&profile) {
            Ok(()) => {
                self.mode = CameraMode::StillConfigured;
                info!("camera configured for still capture");
                Ok(())
            }
            Err(source) => {
                let _ = self.driver.stop();
                self.mode = CameraMode::Idle;
                Err(ServiceError::ModeTransition {
                    target: CameraMode::StillConfigured,
                    source,
                })
            }
        }
    }

    /// Issue one still capture. `flush_timestamp` is forwarded to the
    /// driver as an optional hint.
    pub fn capture(&mut self, flush_timestamp: Option<u64>) -> Result<CaptureResult, ServiceError> {
        self.expect(CameraMode::StillConfigured)?;
        let request = self.driver.capture_request(flush_timestamp)?;
        let result = CaptureResult {
            pixels: request.pixels().to_vec(),
            width: request.width(),
            height: request.height(),
            metadata: request.metadata().clone(),
        };
        request.release();
        Ok(result)
    }

    pub fn sync_status(&mut self) -> Result<SyncStatus, ServiceError> {
        self.expect(CameraMode::StillConfigured)?;
        sync::probe(self.driver.as_mut()).map_err(ServiceError::from)
    }

    /// Switch to the video profile, attach the encoder and make the
    /// stream listener live. Idempotent while already streaming.
    pub async fn start_preview(&mut self, controls: ControlsMap) -> Result<(), ServiceError> {
        match self.mode {
            CameraMode::Streaming => return Ok(()),
            CameraMode::StillConfigured => {}
            CameraMode::Idle => return Err(ServiceError::InvalidMode { mode: self.mode }),
        }

        let profile = CameraProfile::from_config(&CONFIG.load().video, controls);
        if let Err(source) = self.apply_profile(&profile) {
            self.recover_to_still();
            return Err(ServiceError::ModeTransition {
                target: CameraMode::Streaming,
                source,
            });
        }

        self.slot.open();
        if let Err(source) = self.driver.start_encoder(Arc::new(self.slot.clone())) {
            self.slot.clear();
            self.recover_to_still();
            return Err(ServiceError::ModeTransition {
                target: CameraMode::Streaming,
                source,
            });
        }

        if self.server.is_none() {
            match StreamServer::bind(self.stream_addr, self.slot.clone()).await {
                Ok(server) => self.server = Some(server),
                Err(e) => {
                    self.slot.clear();
                    if let Err(err) = self.driver.stop_encoder() {
                        warn!(error = %err, "encoder did not stop cleanly");
                    }
                    self.recover_to_still();
                    return Err(ServiceError::ListenerBind(e));
                }
            }
        }

        self.mode = CameraMode::Streaming;
        info!("preview streaming started");
        Ok(())
    }

    /// Tear down streaming and reapply a still profile. Connected
    /// sessions observe stream-ended and close; the listener stays bound
    /// and answers "stream not active" until the next preview.
    pub fn stop_preview(&mut self, controls: ControlsMap) -> Result<(), ServiceError> {
        self.expect(CameraMode::Streaming)?;

        // Release waiting sessions before touching the driver
        self.slot.clear();
        if let Err(e) = self.driver.stop_encoder() {
            warn!(error = %e, "encoder did not stop cleanly");
        }

        let profile = CameraProfile::from_config(&CONFIG.load().still, controls);
        match self.apply_profile(&profile) {
            Ok(()) => {
                self.mode = CameraMode::StillConfigured;
                info!("preview stopped, camera back in still mode");
                Ok(())
            }
            Err(source) => {
                let _ = self.driver.stop();
                self.mode = CameraMode::Idle;
                Err(ServiceError::ModeTransition {
                    target: CameraMode::StillConfigured,
                    source,
                })
            }
        }
    }

    /// Forward controls to the driver verbatim; validation is the
    /// driver's responsibility.
    pub fn set_controls(&mut self, controls: &ControlsMap) -> Result<(), ServiceError> {
        self.driver.set_controls(controls).map_err(ServiceError::from)
    }

    pub fn controls(&self) -> Result<ControlsMap, ServiceError> {
        self.driver.controls().map_err(ServiceError::from)
    }

    /// Orderly release of every resource on any exit path: sessions,
    /// encoder, listener, driver.
    pub fn shutdown(&mut self) {
        if self.mode == CameraMode::Streaming {
            self.slot.clear();
            if let Err(e) = self.driver.stop_encoder() {
                warn!(error = %e, "encoder did not stop cleanly");
            }
        }
        if let Some(server) = self.server.take() {
            server.shutdown();
        }
        if let Err(e) = self.driver.stop() {
            warn!(error = %e, "driver did not stop cleanly");
        }
        self.mode = CameraMode::Idle;
        info!("camera service shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::driver::ControlValue;
    use crate::camera::SimulatedCamera;
    use std::time::Duration;

    fn controller() -> (ModeController, crate::camera::simulated::SimHandle) {
        let driver = SimulatedCamera::with_frame_interval(Duration::from_millis(5));
        let handle = driver.handle();
        let ctrl = ModeController::new(Box::new(driver), "127.0.0.1:0".parse().unwrap());
        (ctrl, handle)
    }

    #[tokio::test]
    async fn still_capture_matches_configured_resolution() {
        let (mut ctrl, _) = controller();
        ctrl.configure_still(ControlsMap::new()).unwrap();

        let result = ctrl.capture(None).unwrap();
        assert_eq!(result.width, 3280);
        assert_eq!(result.height, 2464);
        assert_eq!(result.pixels.len(), 3280 * 2464 * 3);
        assert!(!result.metadata.is_empty());
    }

    #[tokio::test]
    async fn capture_rejected_outside_still_mode() {
        let (mut ctrl, _) = controller();
        assert!(matches!(
            ctrl.capture(None),
            Err(ServiceError::InvalidMode {
                mode: CameraMode::Idle
            })
        ));

        ctrl.configure_still(ControlsMap::new()).unwrap();
        ctrl.start_preview(ControlsMap::new()).await.unwrap();
        assert!(matches!(
            ctrl.capture(None),
            Err(ServiceError::InvalidMode {
                mode: CameraMode::Streaming
            })
        ));
        assert!(matches!(
            ctrl.sync_status(),
            Err(ServiceError::InvalidMode {
                mode: CameraMode::Streaming
            })
        ));
    }

    #[tokio::test]
    async fn start_preview_is_idempotent() {
        let (mut ctrl, _) = controller();
        ctrl.configure_still(ControlsMap::new()).unwrap();
        ctrl.start_preview(ControlsMap::new()).await.unwrap();
        let addr = ctrl.stream_addr().unwrap();

        ctrl.start_preview(ControlsMap::new()).await.unwrap();
        assert_eq!(ctrl.stream_addr(), Some(addr));
        assert_eq!(ctrl.mode(), CameraMode::Streaming);
    }

    #[tokio::test]
    async fn stop_preview_returns_to_still_and_capture_works() {
        let (mut ctrl, _) = controller();
        ctrl.configure_still(ControlsMap::new()).unwrap();
        ctrl.start_preview(ControlsMap::new()).await.unwrap();

        ctrl.stop_preview(ControlsMap::new()).unwrap();
        assert_eq!(ctrl.mode(), CameraMode::StillConfigured);
        assert!(ctrl.capture(None).is_ok());

        // stop_preview again is rejected, not silently reapplied
        assert!(matches!(
            ctrl.stop_preview(ControlsMap::new()),
            Err(ServiceError::InvalidMode { .. })
        ));
    }

    #[tokio::test]
    async fn failed_transition_rolls_back_to_still() {
        let (mut ctrl, handle) = controller();
        ctrl.configure_still(ControlsMap::new()).unwrap();

        handle.fail_next_configure();
        let err = ctrl.start_preview(ControlsMap::new()).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::ModeTransition {
                target: CameraMode::Streaming,
                ..
            }
        ));

        assert_eq!(ctrl.mode(), CameraMode::StillConfigured);
        assert!(ctrl.capture(None).is_ok());
    }

    #[tokio::test]
    async fn flush_timestamp_is_forwarded_to_the_driver() {
        let (mut ctrl, handle) = controller();
        ctrl.configure_still(ControlsMap::new()).unwrap();

        ctrl.capture(Some(123_456_789)).unwrap();
        assert_eq!(handle.last_flush(), Some(123_456_789));

        ctrl.capture(None).unwrap();
        assert_eq!(handle.last_flush(), None);
    }

    #[tokio::test]
    async fn controls_pass_through_and_echo() {
        let (mut ctrl, _) = controller();
        ctrl.configure_still(ControlsMap::new()).unwrap();

        let mut controls = ControlsMap::new();
        controls.insert("ExposureTime".into(), ControlValue::Int(10_000));
        ctrl.set_controls(&controls).unwrap();

        let echoed = ctrl.controls().unwrap();
        assert_eq!(echoed.get("ExposureTime"), Some(&ControlValue::Int(10_000)));
    }
}

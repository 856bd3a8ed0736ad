//! Multi-camera sync readiness derived from capture metadata

use crate::camera::driver::{
    CameraDriver, ControlValue, DriverRequest, SYNC_READY_KEY, SYNC_TIMER_KEY,
};
use crate::error::DriverError;

/// Timing alignment reading for multi-camera rigs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncStatus {
    /// Hardware reports the sensors are frame-aligned
    pub ready: bool,
    /// Remaining alignment error in microseconds
    pub timer_us: i64,
}

/// Issue one capture request, read the two sync fields verbatim and
/// release the request. Fields the driver does not report read as
/// not-ready with zero error.
pub fn probe(driver: &mut dyn CameraDriver) -> Result<SyncStatus, DriverError> {
    let request = driver.capture_request(None)?;

    let ready = match request.metadata().get(SYNC_READY_KEY) {
        Some(ControlValue::Bool(b)) => *b,
        Some(ControlValue::Int(i)) => *i != 0,
        _ => false,
    };
    let timer_us = match request.metadata().get(SYNC_TIMER_KEY) {
        Some(ControlValue::Int(i)) => *i,
        _ => 0,
    };

    request.release();
    Ok(SyncStatus { ready, timer_us })
}

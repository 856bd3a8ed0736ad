//! Camera driver boundary
//!
//! The physical sensor stack lives behind [`CameraDriver`] so the service
//! can be exercised against the simulator and deployed against real
//! hardware using the same interface. The service never interprets
//! controls or metadata; both pass through verbatim.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::DriverError;
use crate::ProfileConfig;

/// Metadata key for multi-camera sync readiness
pub const SYNC_READY_KEY: &str = "SyncReady";
/// Metadata key for the remaining sync error in microseconds
pub const SYNC_TIMER_KEY: &str = "SyncTimer";

/// Pixel formats the service configures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Bgr888,
    Xbgr8888,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorSpace {
    Sycc,
    Rec709,
}

/// Sensor-plane transform applied by the ISP
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transform {
    pub hflip: bool,
    pub vflip: bool,
}

/// A scalar control or metadata value, driver-defined
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Control name to value mapping, forwarded to the driver uninterpreted
pub type ControlsMap = HashMap<String, ControlValue>;

/// Full sensor configuration applied on every mode switch
#[derive(Debug, Clone)]
pub struct CameraProfile {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub color_space: ColorSpace,
    pub transform: Transform,
    /// Sensor readout size, usually matching the output size
    pub sensor_output: (u32, u32),
    pub sensor_bit_depth: u8,
    pub buffer_count: u32,
    pub controls: ControlsMap,
}

impl CameraProfile {
    pub fn from_config(config: &ProfileConfig, controls: ControlsMap) -> Self {
        Self {
            width: config.width,
            height: config.height,
            format: config.format,
            color_space: config.color_space,
            transform: Transform::default(),
            sensor_output: (config.width, config.height),
            sensor_bit_depth: config.bit_depth,
            buffer_count: config.buffer_count,
            controls,
        }
    }
}

/// Destination for encoded frames produced while streaming. The driver's
/// encoder callback invokes this from its own context; implementations
/// must not block.
pub trait EncodedSink: Send + Sync {
    fn write_frame(&self, data: Bytes);
}

/// One completed still request. Driver buffers stay pinned until
/// [`DriverRequest::release`] is called, mirroring hardware request
/// queues that recycle buffers explicitly.
pub trait DriverRequest: Send {
    fn pixels(&self) -> &[u8];
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn metadata(&self) -> &ControlsMap;
    /// Return the underlying buffers to the driver
    fn release(self: Box<Self>);
}

/// Unified camera interface
///
/// All calls are serialized by the mode controller; implementations may
/// assume single-threaded access to the handle.
pub trait CameraDriver: Send {
    /// Apply a sensor profile. The camera must be stopped first.
    fn configure(&mut self, profile: &CameraProfile) -> Result<(), DriverError>;

    fn start(&mut self) -> Result<(), DriverError>;

    fn stop(&mut self) -> Result<(), DriverError>;

    /// Issue one capture request and wait for its completion.
    ///
    /// `flush_timestamp` is an optional monotonic-nanosecond hint asking
    /// the driver to discard frames exposed before that instant; drivers
    /// are free to ignore it.
    fn capture_request(
        &mut self,
        flush_timestamp: Option<u64>,
    ) -> Result<Box<dyn DriverRequest>, DriverError>;

    /// Attach the MJPEG encoder and begin delivering encoded frames to
    /// `sink` from the driver's callback context.
    fn start_encoder(&mut self, sink: Arc<dyn EncodedSink>) -> Result<(), DriverError>;

    fn stop_encoder(&mut self) -> Result<(), DriverError>;

    fn set_controls(&mut self, controls: &ControlsMap) -> Result<(), DriverError>;

    fn controls(&self) -> Result<ControlsMap, DriverError>;
}

//! Software camera used for development and tests
//!
//! Behaves like the hardware stack at the [`CameraDriver`] boundary:
//! controls echo back, still requests return buffers at the configured
//! resolution, and an attached encoder delivers synthetic JPEG frames
//! from a background thread at a fixed cadence.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tracing::debug;

use crate::camera::driver::{
    CameraDriver, CameraProfile, ControlValue, ControlsMap, DriverRequest, EncodedSink,
    SYNC_READY_KEY, SYNC_TIMER_KEY,
};
use crate::error::DriverError;

/// Knobs shared with [`SimHandle`] for steering the simulator externally
#[derive(Debug)]
struct SimState {
    fail_next_configure: AtomicBool,
    sync_ready: AtomicBool,
    sync_timer_us: AtomicI64,
    last_flush: Mutex<Option<u64>>,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            fail_next_configure: AtomicBool::new(false),
            sync_ready: AtomicBool::new(true),
            sync_timer_us: AtomicI64::new(0),
            last_flush: Mutex::new(None),
        }
    }
}

/// Test-side handle for injecting faults and scripted sync readings
#[derive(Clone)]
pub struct SimHandle {
    state: Arc<SimState>,
}

impl SimHandle {
    /// Make the next `configure` call fail, as a misbehaving sensor would
    pub fn fail_next_configure(&self) {
        self.state.fail_next_configure.store(true, Ordering::SeqCst);
    }

    pub fn set_sync(&self, ready: bool, timer_us: i64) {
        self.state.sync_ready.store(ready, Ordering::SeqCst);
        self.state.sync_timer_us.store(timer_us, Ordering::SeqCst);
    }

    /// Flush timestamp observed by the most recent capture request
    pub fn last_flush(&self) -> Option<u64> {
        *self.state.last_flush.lock().unwrap()
    }
}

struct EncoderTask {
    stop: Arc<AtomicBool>,
    thread: thread::JoinHandle<()>,
}

pub struct SimulatedCamera {
    profile: Option<CameraProfile>,
    running: bool,
    controls: ControlsMap,
    frame_interval: Duration,
    encoder: Option<EncoderTask>,
    state: Arc<SimState>,
}

impl SimulatedCamera {
    pub fn new() -> Self {
        Self::with_frame_interval(Duration::from_millis(33))
    }

    pub fn with_frame_interval(frame_interval: Duration) -> Self {
        Self {
            profile: None,
            running: false,
            controls: ControlsMap::new(),
            frame_interval,
            encoder: None,
            state: Arc::new(SimState::default()),
        }
    }

    pub fn handle(&self) -> SimHandle {
        SimHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn stop_encoder_thread(&mut self) {
        if let Some(task) = self.encoder.take() {
            task.stop.store(true, Ordering::SeqCst);
            let _ = task.thread.join();
        }
    }
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SimulatedCamera {
    fn drop(&mut self) {
        self.stop_encoder_thread();
    }
}

/// Minimal JPEG-shaped payload with the sequence number embedded after
/// the start-of-image marker
fn fake_jpeg(sequence: u64) -> Bytes {
    let mut buf = Vec::with_capacity(1024);
    buf.extend_from_slice(&[0xFF, 0xD8]);
    buf.extend_from_slice(&sequence.to_be_bytes());
    buf.resize(1022, 0);
    buf.extend_from_slice(&[0xFF, 0xD9]);
    Bytes::from(buf)
}

struct SimRequest {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    metadata: ControlsMap,
}

impl DriverRequest for SimRequest {
    fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn metadata(&self) -> &ControlsMap {
        &self.metadata
    }

    fn release(self: Box<Self>) {}
}

impl CameraDriver for SimulatedCamera {
    fn configure(&mut self, profile: &CameraProfile) -> Result<(), DriverError> {
        if self.running {
            return Err(DriverError::Config(
                "cannot configure while the camera is running".into(),
            ));
        }
        if self.state.fail_next_configure.swap(false, Ordering::SeqCst) {
            return Err(DriverError::Config("injected configure failure".into()));
        }
        debug!(
            width = profile.width,
            height = profile.height,
            buffers = profile.buffer_count,
            "simulated camera configured"
        );
        self.controls.extend(profile.controls.clone());
        self.profile = Some(profile.clone());
        Ok(())
    }

    fn start(&mut self) -> Result<(), DriverError> {
        if self.profile.is_none() {
            return Err(DriverError::Hardware("camera is not configured".into()));
        }
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DriverError> {
        self.stop_encoder_thread();
        self.running = false;
        Ok(())
    }

    fn capture_request(
        &mut self,
        flush_timestamp: Option<u64>,
    ) -> Result<Box<dyn DriverRequest>, DriverError> {
        if !self.running {
            return Err(DriverError::Capture("camera is not started".into()));
        }
        let profile = self
            .profile
            .as_ref()
            .ok_or_else(|| DriverError::Capture("camera is not configured".into()))?;

        *self.state.last_flush.lock().unwrap() = flush_timestamp;

        let exposure = self
            .controls
            .get("ExposureTime")
            .cloned()
            .unwrap_or(ControlValue::Int(10_000));
        let sensor_ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as i64;

        let mut metadata = ControlsMap::new();
        metadata.insert("ExposureTime".into(), exposure);
        metadata.insert("AnalogueGain".into(), ControlValue::Float(1.0));
        metadata.insert("SensorTimestamp".into(), ControlValue::Int(sensor_ts));
        metadata.insert(
            SYNC_READY_KEY.into(),
            ControlValue::Bool(self.state.sync_ready.load(Ordering::SeqCst)),
        );
        metadata.insert(
            SYNC_TIMER_KEY.into(),
            ControlValue::Int(self.state.sync_timer_us.load(Ordering::SeqCst)),
        );

        let len = (profile.width as usize) * (profile.height as usize) * 3;
        Ok(Box::new(SimRequest {
            pixels: vec![0x80; len],
            width: profile.width,
            height: profile.height,
            metadata,
        }))
    }

    fn start_encoder(&mut self, sink: Arc<dyn EncodedSink>) -> Result<(), DriverError> {
        if !self.running {
            return Err(DriverError::Hardware("camera is not started".into()));
        }
        if self.encoder.is_some() {
            return Err(DriverError::Hardware("encoder already attached".into()));
        }

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let interval = self.frame_interval;
        let thread = thread::spawn(move || {
            let mut sequence = 0u64;
            while !stop_flag.load(Ordering::SeqCst) {
                sink.write_frame(fake_jpeg(sequence));
                sequence += 1;
                thread::sleep(interval);
            }
        });

        self.encoder = Some(EncoderTask { stop, thread });
        Ok(())
    }

    fn stop_encoder(&mut self) -> Result<(), DriverError> {
        self.stop_encoder_thread();
        Ok(())
    }

    fn set_controls(&mut self, controls: &ControlsMap) -> Result<(), DriverError> {
        self.controls.extend(controls.clone());
        Ok(())
    }

    fn controls(&self) -> Result<ControlsMap, DriverError> {
        Ok(self.controls.clone())
    }
}

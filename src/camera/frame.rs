use bytes::Bytes;

use crate::camera::driver::ControlsMap;

/// One encoded JPEG frame with zero-copy semantics
#[derive(Debug, Clone)]
pub struct Frame {
    /// Immutable frame data - can be shared across sessions without copying
    pub data: Bytes,

    /// Monotonically increasing publish counter, used by sessions to
    /// detect freshness
    pub sequence: u64,
}

/// Result of a single still capture. Ownership transfers to the caller;
/// the service keeps nothing.
#[derive(Debug, Clone)]
pub struct CaptureResult {
    /// Raw flattened pixel array in the configured still format
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Driver metadata for this exposure (exposure time, gain, sync fields)
    pub metadata: ControlsMap,
}

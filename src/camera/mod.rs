pub mod driver;
pub mod frame;
pub mod simulated;
pub mod sync;

pub use driver::{
    CameraDriver, CameraProfile, ColorSpace, ControlValue, ControlsMap, EncodedSink, PixelFormat,
    Transform,
};
pub use frame::{CaptureResult, Frame};
pub use simulated::SimulatedCamera;
pub use sync::SyncStatus;

//! Error taxonomy for the camera service

use thiserror::Error;

use crate::modes::CameraMode;

/// Failure from the external camera driver. Opaque to the service:
/// capture and control calls surface it verbatim and stay in the
/// current mode.
#[derive(Debug, Clone, Error)]
pub enum DriverError {
    #[error("camera hardware error: {0}")]
    Hardware(String),
    #[error("capture failed: {0}")]
    Capture(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Errors surfaced by the service facade
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Operation is not valid in the current camera mode
    #[error("operation not valid while in {mode:?} mode")]
    InvalidMode { mode: CameraMode },

    /// Driver reconfiguration failed while switching modes. The service
    /// rolls back to the prior mode when it can, otherwise to Idle.
    #[error("could not switch to {target:?} mode: {source}")]
    ModeTransition {
        target: CameraMode,
        source: DriverError,
    },

    /// Driver failure outside a mode transition
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// The MJPEG listener could not bind its port; the preview
    /// transition is aborted and rolled back.
    #[error("failed to bind stream listener: {0}")]
    ListenerBind(#[source] std::io::Error),
}

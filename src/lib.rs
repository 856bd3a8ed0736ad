pub mod camera;
pub mod error;
pub mod modes;
pub mod service;
pub mod stream;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::camera::{ColorSpace, PixelFormat};

/// Global configuration that can be atomically swapped at runtime
pub static CONFIG: once_cell::sync::Lazy<ArcSwap<Config>> =
    once_cell::sync::Lazy::new(|| ArcSwap::from_pointee(Config::default()));

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub still: ProfileConfig,
    pub video: ProfileConfig,
    pub stream: StreamConfig,
}

/// Sensor profile applied when entering a mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub color_space: ColorSpace,
    pub bit_depth: u8,
    pub buffer_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Port the MJPEG listener binds on all interfaces
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            still: ProfileConfig {
                width: 3280,
                height: 2464,
                format: PixelFormat::Bgr888,
                color_space: ColorSpace::Sycc,
                bit_depth: 10,
                buffer_count: 1,
            },
            video: ProfileConfig {
                width: 1640,
                height: 1232,
                format: PixelFormat::Xbgr8888,
                color_space: ColorSpace::Rec709,
                bit_depth: 10,
                buffer_count: 6,
            },
            stream: StreamConfig { port: 8000 },
        }
    }
}

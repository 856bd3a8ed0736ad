pub mod server;
pub mod slot;

pub use server::{StreamServer, STREAM_PATH};
pub use slot::{FrameReceiver, FrameSlot, StreamEnded};

//! facegate-hw — Camera capture and frame encoding.
//!
//! V4L2 capture converted to grayscale, with dark-frame rejection and
//! PNG encoding for upload.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::{Frame, FrameError};

//! facecard-hw — Hardware abstraction for camera capture.
//!
//! Provides V4L2-based camera access with frames converted to packed RGB.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, FrameStream, PixelFormat};
pub use frame::Frame;

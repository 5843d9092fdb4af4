//! vigil-hw — Hardware abstraction for camera capture.
//!
//! Provides V4L2-based RGBA frame acquisition behind the `FrameSource`
//! seam, plus pixel format conversion and JPEG snapshot encoding.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, FrameSource, PixelFormat};
pub use frame::RgbaFrame;

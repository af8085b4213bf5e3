pub mod v4l2;

pub use v4l2::{Camera, CameraInfo, CameraSession};

use crate::common::Result;
use image::DynamicImage;

/// A stream of frames; the camera in production, canned images in tests.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<DynamicImage>;
}

//! The person at the keyboard during a camera session.

use crate::common::Result;
use crate::core::detector::FaceBox;
use image::DynamicImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorKey {
    /// SPACE: take the current frame.
    Capture,
    /// ESC: end the session.
    Quit,
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OverlayKind {
    /// A face during registration.
    Detected,
    Recognized,
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub face: FaceBox,
    pub label: Option<String>,
    pub kind: OverlayKind,
}

impl Overlay {
    pub fn detected(face: FaceBox) -> Self {
        Self { face, label: None, kind: OverlayKind::Detected }
    }
}

/// Shows frames to the operator and reports their key presses.
pub trait Operator {
    fn poll_key(&mut self) -> Result<OperatorKey>;

    fn show(&mut self, frame: &DynamicImage, overlays: &[Overlay], status: &str) -> Result<()>;
}

//! Scripted stand-ins for the camera, detector, recognizer and operator.

use crate::camera::FrameSource;
use crate::common::Result;
use crate::core::detector::{FaceBox, FaceDetector};
use crate::core::lbph::{FaceRecognizer, Prediction};
use crate::core::operator::{Operator, OperatorKey, Overlay};
use image::{DynamicImage, GrayImage, Luma};
use std::cell::RefCell;
use std::collections::VecDeque;

pub const FRAME_SIDE: u32 = 64;

/// Checkerboard frame the detector treats as containing a face. `cell`
/// changes the texture so different students give different histograms.
pub fn face_frame(cell: u32) -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_fn(FRAME_SIDE, FRAME_SIDE, |x, y| {
        if (x / cell + y / cell) % 2 == 0 { Luma([40]) } else { Luma([220]) }
    }))
}

pub fn bright_frame() -> DynamicImage {
    face_frame(4)
}

pub fn dark_frame() -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_pixel(FRAME_SIDE, FRAME_SIDE, Luma([0])))
}

/// Finds one centred face in any frame with a pixel brighter than 100.
pub struct ThresholdDetector;

impl FaceDetector for ThresholdDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<FaceBox>> {
        let gray = image.to_luma8();
        if !gray.pixels().any(|p| p[0] > 100) {
            return Ok(Vec::new());
        }
        let (w, h) = (gray.width() as f32, gray.height() as f32);
        Ok(vec![FaceBox { x1: w * 0.2, y1: h * 0.2, x2: w * 0.8, y2: h * 0.8, confidence: 0.9 }])
    }
}

/// Returns queued predictions in order, then `None`.
#[derive(Default)]
pub struct ScriptedRecognizer {
    predictions: RefCell<VecDeque<Option<Prediction>>>,
}

impl ScriptedRecognizer {
    pub fn new(predictions: Vec<Option<Prediction>>) -> Self {
        Self { predictions: RefCell::new(predictions.into()) }
    }
}

impl FaceRecognizer for ScriptedRecognizer {
    fn predict(&self, _face: &GrayImage) -> Option<Prediction> {
        self.predictions.borrow_mut().pop_front().flatten()
    }
}

/// Yields the given frames in order and keeps repeating the last one.
pub struct StaticFrames {
    frames: VecDeque<DynamicImage>,
}

impl StaticFrames {
    pub fn new(frames: Vec<DynamicImage>) -> Self {
        Self { frames: frames.into() }
    }

    pub fn repeat(frame: DynamicImage) -> Self {
        Self::new(vec![frame])
    }
}

impl FrameSource for StaticFrames {
    fn next_frame(&mut self) -> Result<DynamicImage> {
        if self.frames.len() > 1 {
            if let Some(frame) = self.frames.pop_front() {
                return Ok(frame);
            }
        }
        Ok(self.frames.front().cloned().unwrap_or_else(dark_frame))
    }
}

/// Plays back key presses and records what was shown. Presses `Quit` once
/// the script runs out.
#[derive(Default)]
pub struct ScriptedOperator {
    keys: VecDeque<OperatorKey>,
    pub statuses: Vec<String>,
    pub overlays: Vec<Vec<Overlay>>,
}

impl ScriptedOperator {
    pub fn new(keys: Vec<OperatorKey>) -> Self {
        Self { keys: keys.into(), ..Self::default() }
    }
}

impl Operator for ScriptedOperator {
    fn poll_key(&mut self) -> Result<OperatorKey> {
        Ok(self.keys.pop_front().unwrap_or(OperatorKey::Quit))
    }

    fn show(&mut self, _frame: &DynamicImage, overlays: &[Overlay], status: &str) -> Result<()> {
        self.statuses.push(status.to_string());
        self.overlays.push(overlays.to_vec());
        Ok(())
    }
}

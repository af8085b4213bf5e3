use crate::common::{AttendanceError, Config, Result};
use crate::common::config::DetectorConfig;
use ort::{Environment, Session, SessionBuilder, Value, GraphOptimizationLevel};
use std::sync::Arc;
use image::{DynamicImage, GrayImage, imageops::FilterType};
use ndarray::{Array4, CowArray};

#[derive(Debug, Clone, PartialEq)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

impl FaceBox {
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Pixel rectangle `(x, y, w, h)` clamped to an image of the given size.
    /// `None` when nothing of the box lies inside the image.
    pub fn clamped_rect(&self, img_width: u32, img_height: u32) -> Option<(u32, u32, u32, u32)> {
        let x1 = self.x1.max(0.0).floor() as u32;
        let y1 = self.y1.max(0.0).floor() as u32;
        let x2 = (self.x2.min(img_width as f32).ceil().max(0.0)) as u32;
        let y2 = (self.y2.min(img_height as f32).ceil().max(0.0)) as u32;

        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some((x1, y1, x2 - x1, y2 - y1))
    }
}

/// Anything that finds faces in a frame.
pub trait FaceDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<FaceBox>>;
}

/// Grayscale crop of a detected face, the form the recognizer consumes.
pub fn crop_face(gray: &GrayImage, face: &FaceBox) -> Option<GrayImage> {
    let (x, y, w, h) = face.clamped_rect(gray.width(), gray.height())?;
    Some(image::imageops::crop_imm(gray, x, y, w, h).to_image())
}

/// YOLO-style ONNX face detector run through onnxruntime.
pub struct OnnxFaceDetector {
    session: Session,
    _environment: Arc<Environment>,
    config: DetectorConfig,
}

impl OnnxFaceDetector {
    pub fn new(config: &Config) -> Result<Self> {
        let environment = Arc::new(
            Environment::builder()
                .with_name("face_detector")
                .build()
                .map_err(|e| AttendanceError::Model(format!("Failed to create environment: {}", e)))?
        );

        let model_path = &config.models.detector_path;
        if !model_path.exists() {
            return Err(AttendanceError::Model(
                format!("Detector model not found at: {:?}", model_path)
            ));
        }

        let opt_level = match config.detector.optimization_level {
            0 => GraphOptimizationLevel::Disable,
            1 => GraphOptimizationLevel::Level1,
            2 => GraphOptimizationLevel::Level2,
            _ => GraphOptimizationLevel::Level3,
        };
        let session = SessionBuilder::new(&environment)?
            .with_optimization_level(opt_level)?
            .with_model_from_file(model_path)?;

        tracing::debug!("Loaded face detector from {:?}", model_path);

        Ok(Self {
            session,
            _environment: environment,
            config: config.detector.clone(),
        })
    }

    fn image_to_array(&self, img: &DynamicImage) -> Array4<f32> {
        let rgb = img.to_rgb8();
        let width = img.width() as usize;
        let height = img.height() as usize;
        let mut array = Array4::<f32>::zeros((1, 3, height, width));

        let norm_factor = 1.0 / 255.0;
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            array[[0, 0, y, x]] = pixel[0] as f32 * norm_factor;
            array[[0, 1, y, x]] = pixel[1] as f32 * norm_factor;
            array[[0, 2, y, x]] = pixel[2] as f32 * norm_factor;
        }

        array
    }

    fn parse_detections(&self, outputs: &[Value]) -> Result<Vec<FaceBox>> {
        let Some(first) = outputs.first() else {
            return Ok(Vec::new());
        };
        let output = first.try_extract::<f32>()?.view().to_owned();
        let shape = output.shape().to_vec();
        let values: Vec<f32> = output.iter().copied().collect();

        let candidates = decode_predictions(
            &values,
            &shape,
            self.config.input_width as f32,
            self.config.input_height as f32,
        );

        // NMS on the low-threshold set first so duplicates go before the real cut.
        let mut faces = non_max_suppression(candidates, self.config.nms_iou);
        faces.retain(|face| face.confidence >= self.config.confidence);
        faces.truncate(self.config.max_faces);
        Ok(faces)
    }
}

impl FaceDetector for OnnxFaceDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<FaceBox>> {
        let orig_width = image.width() as f32;
        let orig_height = image.height() as f32;

        let img_array = if image.width() == self.config.input_width
            && image.height() == self.config.input_height {
            self.image_to_array(image)
        } else {
            let resized = image.resize_exact(
                self.config.input_width,
                self.config.input_height,
                FilterType::Nearest,
            );
            self.image_to_array(&resized)
        };

        let cow_array = CowArray::from(img_array.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;
        let outputs = self.session.run(vec![input_tensor])?;

        let mut faces = self.parse_detections(&outputs)?;

        let scale_x = orig_width / self.config.input_width as f32;
        let scale_y = orig_height / self.config.input_height as f32;
        for face in &mut faces {
            face.x1 *= scale_x;
            face.x2 *= scale_x;
            face.y1 *= scale_y;
            face.y2 *= scale_y;
        }

        Ok(faces)
    }
}

/// Turns a raw `[1, N, 5+]` or transposed `[1, 5+, N]` YOLO output into
/// corner boxes in detector input space.
pub fn decode_predictions(values: &[f32], shape: &[usize], input_width: f32, input_height: f32) -> Vec<FaceBox> {
    let (num_predictions, prediction_length, transposed) = match shape.len() {
        n if n >= 3 => {
            // Field-major output only when the field axis holds a full box.
            if (5..=10).contains(&shape[1]) && shape[2] > shape[1] {
                (shape[2], shape[1], true)
            } else {
                (shape[1], shape[2], false)
            }
        }
        2 => (shape[0], shape[1], false),
        _ => {
            tracing::warn!("Unexpected detector output shape: {:?}", shape);
            return Vec::new();
        }
    };
    if prediction_length < 5 || values.len() < num_predictions * prediction_length {
        tracing::warn!("Detector output too short for shape {:?}", shape);
        return Vec::new();
    }

    let at = |i: usize, field: usize| {
        if transposed {
            values[field * num_predictions + i]
        } else {
            values[i * prediction_length + field]
        }
    };

    let mut faces = Vec::new();
    for i in 0..num_predictions {
        let (cx, cy, w, h, confidence) = (at(i, 0), at(i, 1), at(i, 2), at(i, 3), at(i, 4));
        if confidence <= 0.001 {
            continue;
        }

        // Normalized outputs are scaled up to pixels.
        let normalized = cx <= 1.0 && cy <= 1.0 && w <= 1.0 && h <= 1.0;
        let (sx, sy) = if normalized { (input_width, input_height) } else { (1.0, 1.0) };
        let (cx, cy, w, h) = (cx * sx, cy * sy, w * sx, h * sy);

        let x1 = (cx - w / 2.0).max(0.0);
        let y1 = (cy - h / 2.0).max(0.0);
        let x2 = (cx + w / 2.0).min(input_width);
        let y2 = (cy + h / 2.0).min(input_height);

        if x2 - x1 > 10.0 && y2 - y1 > 10.0 {
            faces.push(FaceBox { x1, y1, x2, y2, confidence });
        }
    }
    faces
}

pub fn non_max_suppression(mut boxes: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<FaceBox> = Vec::new();
    for candidate in boxes {
        if keep.iter().all(|kept| iou(kept, &candidate) < iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

pub fn iou(a: &FaceBox, b: &FaceBox) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.width() * a.height() + b.width() * b.height() - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> FaceBox {
        FaceBox { x1, y1, x2, y2, confidence }
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = face(0.0, 0.0, 10.0, 10.0, 0.9);
        let b = face(20.0, 20.0, 30.0, 30.0, 0.9);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn nms_keeps_highest_confidence_of_overlaps() {
        let boxes = vec![
            face(0.0, 0.0, 100.0, 100.0, 0.6),
            face(2.0, 2.0, 102.0, 102.0, 0.9),
            face(300.0, 300.0, 400.0, 400.0, 0.7),
        ];
        let kept = non_max_suppression(boxes, 0.45);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.7);
    }

    #[test]
    fn decodes_standard_layout_in_pixels() {
        // one prediction: center (100, 100), 40x60, conf 0.8
        let values = [100.0, 100.0, 40.0, 60.0, 0.8];
        let faces = decode_predictions(&values, &[1, 1, 5], 640.0, 640.0);
        assert_eq!(faces, vec![face(80.0, 70.0, 120.0, 130.0, 0.8)]);
    }

    #[test]
    fn few_predictions_are_not_read_as_field_major() {
        let values = [
            100.0, 100.0, 40.0, 60.0, 0.8,
            300.0, 300.0, 50.0, 50.0, 0.7,
            0.0, 0.0, 0.0, 0.0, 0.0,
        ];
        let faces = decode_predictions(&values, &[1, 3, 5], 640.0, 640.0);
        assert_eq!(faces, vec![face(80.0, 70.0, 120.0, 130.0, 0.8), face(275.0, 275.0, 325.0, 325.0, 0.7)]);
    }

    #[test]
    fn decodes_transposed_normalized_layout() {
        // six predictions laid out field-major; only the first has confidence
        let values = [
            0.5, 0.1, 0.1, 0.1, 0.1, 0.1, // cx
            0.5, 0.1, 0.1, 0.1, 0.1, 0.1, // cy
            0.25, 0.1, 0.1, 0.1, 0.1, 0.1, // w
            0.25, 0.1, 0.1, 0.1, 0.1, 0.1, // h
            0.9, 0.0, 0.0, 0.0, 0.0, 0.0, // conf
        ];
        let faces = decode_predictions(&values, &[1, 5, 6], 400.0, 400.0);
        assert_eq!(faces, vec![face(150.0, 150.0, 250.0, 250.0, 0.9)]);
    }

    #[test]
    fn tiny_boxes_and_bad_shapes_are_dropped() {
        assert!(decode_predictions(&[100.0, 100.0, 5.0, 5.0, 0.9], &[1, 1, 5], 640.0, 640.0).is_empty());
        assert!(decode_predictions(&[1.0, 2.0], &[2], 640.0, 640.0).is_empty());
    }

    #[test]
    fn crop_face_clamps_to_image() {
        let gray = GrayImage::from_pixel(50, 40, image::Luma([7]));
        let crop = crop_face(&gray, &face(-10.0, 30.0, 20.0, 60.0, 0.9)).unwrap();
        assert_eq!(crop.dimensions(), (20, 10));

        assert!(crop_face(&gray, &face(60.0, 0.0, 80.0, 10.0, 0.9)).is_none());
    }
}

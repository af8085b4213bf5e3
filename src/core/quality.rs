use crate::core::detector::FaceBox;
use image::DynamicImage;

#[derive(Debug, Clone)]
pub struct CaptureQuality {
    pub detection_confidence: f32,
    pub face_size_ratio: f32,
    pub face_centering_score: f32,
    pub brightness_score: f32,
    pub contrast_score: f32,
    pub overall_score: f32,
}

impl CaptureQuality {
    /// Scores a registration photo from the detected face and its pixels.
    pub fn calculate(image: &DynamicImage, face: &FaceBox) -> Self {
        let img_width = image.width().max(1) as f32;
        let img_height = image.height().max(1) as f32;

        let face_area = face.width().max(0.0) * face.height().max(0.0);
        let face_size_ratio = (face_area / (img_width * img_height)).min(1.0);

        let face_center_x = (face.x1 + face.x2) / 2.0;
        let face_center_y = (face.y1 + face.y2) / 2.0;
        let x_offset = ((face_center_x - img_width / 2.0).abs() / (img_width / 2.0)).min(1.0);
        let y_offset = ((face_center_y - img_height / 2.0).abs() / (img_height / 2.0)).min(1.0);
        let face_centering_score = 1.0 - (x_offset + y_offset) / 2.0;

        let (brightness_score, contrast_score) = region_quality(image, face);

        // Small faces are common at webcam distance, so size is capped at 25% of the frame.
        let size_score = (face_size_ratio / 0.25).min(1.0);
        let overall_score = face.confidence.clamp(0.0, 1.0) * 0.3
            + size_score * 0.2
            + face_centering_score * 0.2
            + brightness_score * 0.15
            + contrast_score * 0.15;

        Self {
            detection_confidence: face.confidence,
            face_size_ratio,
            face_centering_score,
            brightness_score,
            contrast_score,
            overall_score,
        }
    }

    pub fn meets(&self, min_quality: f32) -> bool {
        self.overall_score >= min_quality
    }

    pub fn suggestions(&self) -> Vec<&'static str> {
        let mut suggestions = Vec::new();

        if self.face_size_ratio < 0.02 {
            suggestions.push("Move closer to the camera");
        }
        if self.face_centering_score < 0.7 {
            suggestions.push("Center your face in the camera view");
        }
        if self.brightness_score < 0.5 {
            suggestions.push("Improve the lighting");
        }
        if self.contrast_score < 0.5 {
            suggestions.push("Avoid flat or washed-out lighting");
        }

        suggestions
    }
}

/// Brightness peaks at a mean of 128; contrast saturates at a std dev of 64.
fn region_quality(image: &DynamicImage, face: &FaceBox) -> (f32, f32) {
    let gray = image.to_luma8();
    let Some((x, y, w, h)) = face.clamped_rect(gray.width(), gray.height()) else {
        return (0.0, 0.0);
    };

    let region = image::imageops::crop_imm(&gray, x, y, w, h).to_image();
    let count = region.pixels().len() as f32;
    if count == 0.0 {
        return (0.0, 0.0);
    }

    let mean = region.pixels().map(|p| p[0] as f32).sum::<f32>() / count;
    let variance = region
        .pixels()
        .map(|p| (p[0] as f32 - mean).powi(2))
        .sum::<f32>() / count;

    let brightness = 1.0 - ((mean - 128.0).abs() / 128.0);
    let contrast = (variance.sqrt() / 64.0).min(1.0);
    (brightness.clamp(0.0, 1.0), contrast)
}

//! Local Binary Patterns Histogram face recognizer.
//!
//! Each training face is turned into a grid of normalized LBP histograms.
//! Prediction is nearest neighbour over the stored histograms using the
//! symmetric chi-square distance, so `distance` is 0 for an identical face and
//! grows as faces differ. Callers accept a prediction below their threshold.

use crate::common::{AttendanceError, Result};
use crate::common::config::RecognizerConfig;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const MODEL_VERSION: u32 = 1;

// Interpolated neighbours within this of the centre count as equal.
const LBP_EPSILON: f32 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LbphParams {
    pub radius: u32,
    pub neighbors: u32,
    pub grid_x: u32,
    pub grid_y: u32,
}

impl From<&RecognizerConfig> for LbphParams {
    fn from(config: &RecognizerConfig) -> Self {
        Self {
            radius: config.radius,
            neighbors: config.neighbors,
            grid_x: config.grid_x,
            grid_y: config.grid_y,
        }
    }
}

impl Default for LbphParams {
    fn default() -> Self {
        Self { radius: 1, neighbors: 8, grid_x: 8, grid_y: 8 }
    }
}

impl LbphParams {
    fn bins(&self) -> usize {
        1usize << self.neighbors
    }

    /// Smallest face side that still gives every grid cell at least one pixel.
    pub fn min_face_side(&self) -> u32 {
        2 * self.radius + self.grid_x.max(self.grid_y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: u32,
    pub distance: f64,
}

/// Anything that maps a grayscale face crop to the closest known label.
pub trait FaceRecognizer {
    fn predict(&self, face: &GrayImage) -> Option<Prediction>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Sample {
    label: u32,
    histogram: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LbphModel {
    version: u32,
    params: LbphParams,
    samples: Vec<Sample>,
}

impl LbphModel {
    /// Builds a model from labelled face crops. Faces too small for the grid
    /// are skipped; a set with no usable face is an error.
    pub fn train(params: LbphParams, faces: &[(GrayImage, u32)]) -> Result<Self> {
        let samples: Vec<Sample> = faces
            .iter()
            .filter_map(|(face, label)| {
                let histogram = spatial_histogram(face, &params);
                if histogram.is_none() {
                    tracing::debug!("Skipping {}x{} face for label {}", face.width(), face.height(), label);
                }
                histogram.map(|histogram| Sample { label: *label, histogram })
            })
            .collect();

        if samples.is_empty() {
            return Err(AttendanceError::NoFacesFound);
        }

        tracing::info!("Trained LBPH model on {} faces", samples.len());
        Ok(Self { version: MODEL_VERSION, params, samples })
    }

    pub fn params(&self) -> LbphParams {
        self.params
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn labels(&self) -> Vec<u32> {
        let mut labels: Vec<u32> = self.samples.iter().map(|s| s.label).collect();
        labels.sort_unstable();
        labels.dedup();
        labels
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let encoded = bincode::serialize(self)
            .map_err(|e| AttendanceError::Model(format!("Failed to serialize model: {}", e)))?;
        fs::write(path, encoded)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AttendanceError::ModelNotTrained);
        }
        let data = fs::read(path)?;
        let model: Self = bincode::deserialize(&data)
            .map_err(|e| AttendanceError::Model(format!("Failed to deserialize model: {}", e)))?;

        if model.version != MODEL_VERSION {
            return Err(AttendanceError::Model(format!(
                "Unsupported model version {} (expected {}), retrain the model",
                model.version, MODEL_VERSION
            )));
        }
        Ok(model)
    }
}

impl FaceRecognizer for LbphModel {
    fn predict(&self, face: &GrayImage) -> Option<Prediction> {
        let query = spatial_histogram(face, &self.params)?;

        self.samples
            .iter()
            .map(|sample| Prediction {
                label: sample.label,
                distance: chi_square(&sample.histogram, &query),
            })
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }
}

/// Extended (circular) LBP codes with bilinear sampling. The output is
/// `radius` pixels smaller on every side.
pub fn lbp_codes(src: &GrayImage, radius: u32, neighbors: u32) -> Option<(Vec<u32>, u32, u32)> {
    let (width, height) = src.dimensions();
    if width <= 2 * radius || height <= 2 * radius {
        return None;
    }
    let out_w = width - 2 * radius;
    let out_h = height - 2 * radius;
    let mut codes = vec![0u32; (out_w * out_h) as usize];
    let r = radius as f32;
    let pixel = |x: i64, y: i64| src.get_pixel(x as u32, y as u32)[0] as f32;

    for n in 0..neighbors {
        let angle = 2.0 * std::f32::consts::PI * n as f32 / neighbors as f32;
        let x = r * angle.cos();
        let y = -r * angle.sin();

        let (fx, fy) = (x.floor() as i64, y.floor() as i64);
        let (cx, cy) = (x.ceil() as i64, y.ceil() as i64);
        let (tx, ty) = (x - fx as f32, y - fy as f32);
        let w1 = (1.0 - tx) * (1.0 - ty);
        let w2 = tx * (1.0 - ty);
        let w3 = (1.0 - tx) * ty;
        let w4 = tx * ty;

        for i in radius..height - radius {
            for j in radius..width - radius {
                let (row, col) = (i as i64, j as i64);
                let t = w1 * pixel(col + fx, row + fy)
                    + w2 * pixel(col + cx, row + fy)
                    + w3 * pixel(col + fx, row + cy)
                    + w4 * pixel(col + cx, row + cy);
                let center = pixel(col, row);
                if t > center || (t - center).abs() < LBP_EPSILON {
                    let idx = ((i - radius) * out_w + (j - radius)) as usize;
                    codes[idx] |= 1 << n;
                }
            }
        }
    }

    Some((codes, out_w, out_h))
}

/// Concatenated per-cell histograms, each normalized by its cell's pixel count.
pub fn spatial_histogram(face: &GrayImage, params: &LbphParams) -> Option<Vec<f32>> {
    let (codes, width, height) = lbp_codes(face, params.radius, params.neighbors)?;
    let cell_w = width / params.grid_x;
    let cell_h = height / params.grid_y;
    if cell_w == 0 || cell_h == 0 {
        return None;
    }

    let bins = params.bins();
    let mut histogram = vec![0f32; bins * (params.grid_x * params.grid_y) as usize];
    let cell_total = (cell_w * cell_h) as f32;

    for gy in 0..params.grid_y {
        for gx in 0..params.grid_x {
            let offset = ((gy * params.grid_x + gx) as usize) * bins;
            for y in gy * cell_h..(gy + 1) * cell_h {
                for x in gx * cell_w..(gx + 1) * cell_w {
                    let code = codes[(y * width + x) as usize] as usize;
                    histogram[offset + code] += 1.0;
                }
            }
            for bin in &mut histogram[offset..offset + bins] {
                *bin /= cell_total;
            }
        }
    }

    Some(histogram)
}

/// Symmetric chi-square: `2 * sum((a - b)^2 / (a + b))`.
pub fn chi_square(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .filter(|(x, y)| **x + **y > f32::EPSILON)
        .map(|(&x, &y)| {
            let (x, y) = (x as f64, y as f64);
            2.0 * (x - y).powi(2) / (x + y)
        })
        .sum()
}

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::common::error::{AttendanceError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "configs/facecheck.toml";

/// One week.
pub const MAX_REMINDER_LEAD_MINUTES: i64 = 7 * 24 * 60;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub models: ModelConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub recognizer: RecognizerConfig,
    #[serde(default)]
    pub registration: RegistrationConfig,
    #[serde(default)]
    pub attendance: AttendanceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CameraConfig {
    /// `None` picks the first device that can capture video.
    #[serde(default)]
    pub device_index: Option<u32>,
    #[serde(default = "default_camera_width")]
    pub width: u32,
    #[serde(default = "default_camera_height")]
    pub height: u32,
    #[serde(default = "default_warmup_frames")]
    pub warmup_frames: u32,
    #[serde(default = "default_warmup_delay")]
    pub warmup_delay_ms: u64,
}

fn default_camera_width() -> u32 { 640 }
fn default_camera_height() -> u32 { 480 }
fn default_warmup_frames() -> u32 { 3 }
fn default_warmup_delay() -> u64 { 50 }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: None,
            width: default_camera_width(),
            height: default_camera_height(),
            warmup_frames: default_warmup_frames(),
            warmup_delay_ms: default_warmup_delay(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_detector_path")]
    pub detector_path: PathBuf,
}

fn default_detector_path() -> PathBuf {
    PathBuf::from("models/face_detector.onnx")
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self { detector_path: default_detector_path() }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DetectorConfig {
    #[serde(default = "default_detector_input")]
    pub input_width: u32,
    #[serde(default = "default_detector_input")]
    pub input_height: u32,
    #[serde(default = "default_detection_confidence")]
    pub confidence: f32,
    #[serde(default = "default_nms_iou")]
    pub nms_iou: f32,
    #[serde(default = "default_max_faces")]
    pub max_faces: usize,
    #[serde(default = "default_optimization_level")]
    pub optimization_level: u32,
}

fn default_detector_input() -> u32 { 640 }
fn default_detection_confidence() -> f32 { 0.5 }
fn default_nms_iou() -> f32 { 0.45 }
fn default_max_faces() -> usize { 10 }
fn default_optimization_level() -> u32 { 3 }

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            input_width: default_detector_input(),
            input_height: default_detector_input(),
            confidence: default_detection_confidence(),
            nms_iou: default_nms_iou(),
            max_faces: default_max_faces(),
            optimization_level: default_optimization_level(),
        }
    }
}

/// LBPH parameters. The defaults are the classic radius 1, 8 neighbours, 8x8 grid.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecognizerConfig {
    #[serde(default = "default_radius")]
    pub radius: u32,
    #[serde(default = "default_neighbors")]
    pub neighbors: u32,
    #[serde(default = "default_grid")]
    pub grid_x: u32,
    #[serde(default = "default_grid")]
    pub grid_y: u32,
    /// Predictions with a distance strictly below this are accepted.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_radius() -> u32 { 1 }
fn default_neighbors() -> u32 { 8 }
fn default_grid() -> u32 { 8 }
fn default_threshold() -> f64 { 70.0 }

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            radius: default_radius(),
            neighbors: default_neighbors(),
            grid_x: default_grid(),
            grid_y: default_grid(),
            threshold: default_threshold(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RegistrationConfig {
    #[serde(default = "default_photos_required")]
    pub photos_required: usize,
    #[serde(default)]
    pub min_quality: f32,
}

fn default_photos_required() -> usize { 10 }

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            photos_required: default_photos_required(),
            min_quality: 0.0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AttendanceConfig {
    /// Share of a class a student must be seen for before being marked.
    #[serde(default = "default_presence_ratio")]
    pub presence_ratio: f64,
}

fn default_presence_ratio() -> f64 { 0.6 }

impl Default for AttendanceConfig {
    fn default() -> Self {
        Self { presence_ratio: default_presence_ratio() }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Local,
    Remote,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("attendance_data")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RemoteConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default = "default_students_table")]
    pub students_table: String,
    #[serde(default = "default_attendance_table")]
    pub attendance_table: String,
    #[serde(default = "default_photos_table")]
    pub photos_table: String,
    #[serde(default = "default_classes_table")]
    pub classes_table: String,
    #[serde(default = "default_photos_bucket")]
    pub photos_bucket: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_students_table() -> String { "students".into() }
fn default_attendance_table() -> String { "attendance".into() }
fn default_photos_table() -> String { "student_photos".into() }
fn default_classes_table() -> String { "classes".into() }
fn default_photos_bucket() -> String { "student-photos".into() }
fn default_timeout() -> u64 { 30 }

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: None,
            key: None,
            students_table: default_students_table(),
            attendance_table: default_attendance_table(),
            photos_table: default_photos_table(),
            classes_table: default_classes_table(),
            photos_bucket: default_photos_bucket(),
            timeout_seconds: default_timeout(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NotifyConfig {
    #[serde(default)]
    pub telegram_bot_token: Option<String>,
    #[serde(default = "default_telegram_api")]
    pub telegram_api_base: String,
    #[serde(default = "default_reminder_lead")]
    pub reminder_lead_minutes: i64,
}

fn default_telegram_api() -> String { "https://api.telegram.org".into() }
fn default_reminder_lead() -> i64 { 30 }

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            telegram_bot_token: None,
            telegram_api_base: default_telegram_api(),
            reminder_lead_minutes: default_reminder_lead(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PreviewConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub width: Option<usize>,
    #[serde(default)]
    pub height: Option<usize>,
}

fn default_true() -> bool { true }

impl Default for PreviewConfig {
    fn default() -> Self {
        Self { enabled: true, width: None, height: None }
    }
}

fn default_config_candidates() -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from(DEFAULT_CONFIG_PATH)];
    if let Some(project) = directories::ProjectDirs::from("", "", "facecheck") {
        candidates.push(project.config_dir().join("facecheck.toml"));
    }
    candidates
}

impl Config {
    /// Loads the config from `path`, or else from `configs/facecheck.toml`
    /// and then the user config directory. A missing file yields the
    /// defaults; environment overrides are applied either way.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => default_config_candidates()
                .into_iter()
                .find(|p| p.exists())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
        };

        let mut config = if path.exists() {
            tracing::info!("Loading config from: {}", path.display());
            let contents = std::fs::read_to_string(&path)?;
            Self::from_toml(&contents)?
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Config::default()
        };

        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| AttendanceError::Config(format!("Config parse error: {}", e)))
    }

    /// Applies the `SUPABASE_*` and `TELEGRAM_BOT_TOKEN` overrides.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty("SUPABASE_URL") {
            self.remote.url = Some(url);
        }
        if let Some(key) = non_empty("SUPABASE_SERVICE_ROLE_KEY").or_else(|| non_empty("SUPABASE_KEY")) {
            self.remote.key = Some(key);
        }
        if let Some(table) = non_empty("SUPABASE_STUDENTS_TABLE") {
            self.remote.students_table = table;
        }
        if let Some(table) = non_empty("SUPABASE_ATTENDANCE_TABLE") {
            self.remote.attendance_table = table;
        }
        if let Some(table) = non_empty("SUPABASE_STUDENT_PHOTOS_TABLE") {
            self.remote.photos_table = table;
        }
        if let Some(table) = non_empty("SUPABASE_CLASSES_TABLE") {
            self.remote.classes_table = table;
        }
        if let Some(bucket) = non_empty("SUPABASE_PHOTOS_BUCKET") {
            self.remote.photos_bucket = bucket;
        }
        if let Some(token) = non_empty("TELEGRAM_BOT_TOKEN") {
            self.notify.telegram_bot_token = Some(token);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.camera.width == 0 || self.camera.width > 4096 {
            return Err(AttendanceError::Config(format!(
                "Camera width must be between 1 and 4096, got {}", self.camera.width
            )));
        }
        if self.camera.height == 0 || self.camera.height > 4096 {
            return Err(AttendanceError::Config(format!(
                "Camera height must be between 1 and 4096, got {}", self.camera.height
            )));
        }

        if self.detector.input_width == 0 || self.detector.input_width > 4096
            || self.detector.input_height == 0 || self.detector.input_height > 4096
        {
            return Err(AttendanceError::Config(format!(
                "Detector input size must be between 1 and 4096, got {}x{}",
                self.detector.input_width, self.detector.input_height
            )));
        }
        if !(0.0..=1.0).contains(&self.detector.confidence) {
            return Err(AttendanceError::Config(format!(
                "Detection confidence must be between 0.0 and 1.0, got {}",
                self.detector.confidence
            )));
        }

        let r = &self.recognizer;
        if r.radius == 0 || r.radius > 8 {
            return Err(AttendanceError::Config(format!(
                "LBPH radius must be between 1 and 8, got {}", r.radius
            )));
        }
        if r.neighbors == 0 || r.neighbors > 16 {
            return Err(AttendanceError::Config(format!(
                "LBPH neighbors must be between 1 and 16, got {}", r.neighbors
            )));
        }
        if r.grid_x == 0 || r.grid_y == 0 || r.grid_x > 32 || r.grid_y > 32 {
            return Err(AttendanceError::Config(format!(
                "LBPH grid must be between 1x1 and 32x32, got {}x{}", r.grid_x, r.grid_y
            )));
        }
        if !(r.threshold > 0.0 && r.threshold.is_finite()) {
            return Err(AttendanceError::Config(format!(
                "Recognition threshold must be positive, got {}", r.threshold
            )));
        }

        if self.registration.photos_required == 0 || self.registration.photos_required > 100 {
            return Err(AttendanceError::Config(format!(
                "photos_required must be between 1 and 100, got {}",
                self.registration.photos_required
            )));
        }
        if !(0.0..=1.0).contains(&self.registration.min_quality) {
            return Err(AttendanceError::Config(format!(
                "min_quality must be between 0.0 and 1.0, got {}",
                self.registration.min_quality
            )));
        }
        if !(self.attendance.presence_ratio > 0.0 && self.attendance.presence_ratio <= 1.0) {
            return Err(AttendanceError::Config(format!(
                "presence_ratio must be in (0.0, 1.0], got {}",
                self.attendance.presence_ratio
            )));
        }
        if !(0..=MAX_REMINDER_LEAD_MINUTES).contains(&self.notify.reminder_lead_minutes) {
            return Err(AttendanceError::Config(format!(
                "reminder_lead_minutes must be between 0 and {}, got {}",
                MAX_REMINDER_LEAD_MINUTES, self.notify.reminder_lead_minutes
            )));
        }

        Ok(())
    }
}

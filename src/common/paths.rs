use std::path::{Path, PathBuf};
use std::fs;
use chrono::NaiveDate;
use crate::common::error::Result;

const DEV_BASE_DIR: &str = "./dev_data";
const ATTENDANCE_PREFIX: &str = "attendance_";
const ATTENDANCE_SUFFIX: &str = ".json";

/// On-disk layout under the data root:
///
/// ```text
/// <base>/students_db.json
/// <base>/classes.json
/// <base>/students/<reg>_<name>/photo_<n>.jpg
/// <base>/models/face_model.bin
/// <base>/attendance/attendance_<YYYY-MM-DD>.json
/// <base>/captures/
/// ```
#[derive(Debug, Clone)]
pub struct DataDirs {
    base_dir: PathBuf,
    dev: bool,
}

impl DataDirs {
    /// Development mode ignores `base_dir` and keeps everything in `./dev_data`.
    pub fn new(base_dir: &Path, dev: bool) -> Result<Self> {
        let base_dir = if dev {
            PathBuf::from(DEV_BASE_DIR)
        } else {
            base_dir.to_path_buf()
        };

        let dirs = Self { base_dir, dev };
        fs::create_dir_all(dirs.students_dir())?;
        fs::create_dir_all(dirs.models_dir())?;
        fs::create_dir_all(dirs.attendance_dir())?;
        fs::create_dir_all(dirs.captures_dir())?;

        if dev {
            println!("📁 Development mode enabled - data will be saved to: {}",
                     dirs.base_dir.display());
        }
        tracing::debug!("Data directory: {:?}", dirs.base_dir);

        Ok(dirs)
    }

    pub fn is_dev(&self) -> bool {
        self.dev
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn students_dir(&self) -> PathBuf {
        self.base_dir.join("students")
    }

    pub fn models_dir(&self) -> PathBuf {
        self.base_dir.join("models")
    }

    pub fn attendance_dir(&self) -> PathBuf {
        self.base_dir.join("attendance")
    }

    pub fn captures_dir(&self) -> PathBuf {
        self.base_dir.join("captures")
    }

    pub fn students_db_path(&self) -> PathBuf {
        self.base_dir.join("students_db.json")
    }

    pub fn classes_db_path(&self) -> PathBuf {
        self.base_dir.join("classes.json")
    }

    pub fn model_path(&self) -> PathBuf {
        self.models_dir().join("face_model.bin")
    }

    pub fn student_photo_dir(&self, reg_number: &str, name: &str) -> PathBuf {
        self.students_dir().join(student_folder_name(reg_number, name))
    }

    pub fn attendance_file(&self, date: NaiveDate) -> PathBuf {
        self.attendance_dir().join(attendance_file_name(date))
    }

    pub fn capture_path(&self, prefix: &str) -> PathBuf {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        self.captures_dir().join(format!("{}_{}.jpg", prefix, timestamp))
    }
}

/// Replaces anything outside `[A-Za-z0-9_-]` with `_` and collapses runs of `_`.
pub fn sanitize(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.trim().chars() {
        let ch = if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' };
        if ch == '_' && out.ends_with('_') {
            continue;
        }
        out.push(ch);
    }
    out
}

pub fn student_folder_name(reg_number: &str, name: &str) -> String {
    sanitize(&format!("{}_{}", reg_number, name))
}

pub fn attendance_file_name(date: NaiveDate) -> String {
    format!("{}{}{}", ATTENDANCE_PREFIX, date.format("%Y-%m-%d"), ATTENDANCE_SUFFIX)
}

pub fn parse_attendance_file_name(file_name: &str) -> Option<NaiveDate> {
    let date = file_name
        .strip_prefix(ATTENDANCE_PREFIX)?
        .strip_suffix(ATTENDANCE_SUFFIX)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

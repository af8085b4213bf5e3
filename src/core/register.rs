use crate::camera::FrameSource;
use crate::common::{AttendanceError, DataDirs, Result};
use crate::common::config::RegistrationConfig;
use crate::core::detector::FaceDetector;
use crate::core::operator::{Operator, OperatorKey, Overlay};
use crate::core::quality::CaptureQuality;
use crate::storage::{Backend, StudentRecord};
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct RegistrationRequest {
    pub name: String,
    pub reg_number: String,
    pub telegram_id: Option<String>,
}

/// A validated registration waiting for its photos.
#[derive(Debug)]
pub struct PendingRegistration {
    name: String,
    reg_number: String,
    telegram_id: Option<String>,
    photo_dir: PathBuf,
}

impl PendingRegistration {
    /// Checks the request before the camera is opened: both fields must be
    /// non-empty after trimming and the registration number must be new.
    pub fn prepare(request: &RegistrationRequest, backend: &dyn Backend, dirs: &DataDirs) -> Result<Self> {
        let name = request.name.trim();
        let reg_number = request.reg_number.trim();
        if name.is_empty() || reg_number.is_empty() {
            return Err(AttendanceError::Cancelled);
        }

        if backend.find_student(reg_number)?.is_some() {
            return Err(AttendanceError::DuplicateRegistration(reg_number.to_string()));
        }

        let telegram_id = request
            .telegram_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        if telegram_id.is_none() {
            tracing::warn!("Registering {} without a Telegram id; class notifications will skip them", reg_number);
        }

        let photo_dir = unused_photo_dir(dirs, reg_number, name, &backend.students()?);

        Ok(Self {
            name: name.to_string(),
            reg_number: reg_number.to_string(),
            telegram_id,
            photo_dir,
        })
    }

    pub fn photo_dir(&self) -> &PathBuf {
        &self.photo_dir
    }

    /// Runs the capture loop. SPACE keeps the current frame when a face is
    /// in it; ESC aborts, removes the photos taken so far and returns
    /// `Cancelled`.
    pub fn capture(
        &self,
        settings: &RegistrationConfig,
        detector: &dyn FaceDetector,
        frames: &mut dyn FrameSource,
        operator: &mut dyn Operator,
    ) -> Result<Vec<PathBuf>> {
        let created_dir = !self.photo_dir.exists();
        fs::create_dir_all(&self.photo_dir)?;
        let required = settings.photos_required;
        let mut photos = Vec::with_capacity(required);
        let mut hint = String::new();

        while photos.len() < required {
            let frame = frames.next_frame()?;
            let faces = detector.detect(&frame).unwrap_or_else(|e| {
                tracing::warn!("Face detection failed: {}", e);
                Vec::new()
            });

            let overlays: Vec<Overlay> = faces.iter().cloned().map(Overlay::detected).collect();
            let status = format!(
                "Captured: {}/{}  SPACE capture, ESC cancel  {}",
                photos.len(), required, hint
            );
            operator.show(&frame, &overlays, &status)?;

            match operator.poll_key()? {
                OperatorKey::Quit => break,
                OperatorKey::Capture => {
                    let Some(face) = faces.first() else {
                        hint = "No face detected".to_string();
                        continue;
                    };

                    let quality = CaptureQuality::calculate(&frame, face);
                    if !quality.meets(settings.min_quality) {
                        tracing::debug!("Capture quality too low: {:.2}", quality.overall_score);
                        hint = quality.suggestions().join("; ");
                        continue;
                    }

                    let path = self.photo_dir.join(format!("photo_{}.jpg", photos.len() + 1));
                    frame.to_rgb8().save(&path)?;
                    tracing::debug!("Captured {:?} with quality {:.2}", path, quality.overall_score);
                    photos.push(path);
                    hint.clear();
                }
                OperatorKey::None => {}
            }
        }

        if photos.len() < required {
            tracing::info!("Registration of {} cancelled after {} photos", self.reg_number, photos.len());
            discard(&photos, created_dir.then_some(self.photo_dir.as_path()));
            return Err(AttendanceError::Cancelled);
        }

        Ok(photos)
    }

    /// Persists the student once every photo is on disk.
    pub fn complete(self, backend: &mut dyn Backend, photos: &[PathBuf]) -> Result<StudentRecord> {
        let record = StudentRecord {
            id: backend.next_student_id()?,
            name: self.name,
            reg_number: self.reg_number,
            photo_dir: self.photo_dir,
            registered_date: Local::now(),
            telegram_id: self.telegram_id,
            model_trained: false,
            model_trained_at: None,
            profile_photo_url: None,
        };

        let stored = backend.save_student(&record, photos)?;
        tracing::info!("Registered {} ({}) with id {}", stored.name, stored.reg_number, stored.id);
        Ok(stored)
    }
}

/// Sanitized folder names can collide (`R1` + `Ann Lee` and `R1 Ann` +
/// `Lee`), so the first free `<folder>`, `<folder>_2`, ... is used.
fn unused_photo_dir(dirs: &DataDirs, reg_number: &str, name: &str, students: &[StudentRecord]) -> PathBuf {
    let base = dirs.student_photo_dir(reg_number, name);
    let taken = |dir: &Path| dir.exists() || students.iter().any(|s| s.photo_dir == dir);

    let mut candidate = base.clone();
    let mut suffix = 2;
    while taken(&candidate) {
        let mut name = base.as_os_str().to_os_string();
        name.push(format!("_{}", suffix));
        candidate = PathBuf::from(name);
        suffix += 1;
    }
    if candidate != base {
        tracing::info!("{:?} is in use, storing photos in {:?}", base, candidate);
    }
    candidate
}

/// Removes the photos written by an aborted capture, and the directory
/// when the capture created it and nothing else is left in it.
fn discard(photos: &[PathBuf], created_dir: Option<&Path>) {
    for photo in photos {
        if let Err(e) = fs::remove_file(photo) {
            tracing::warn!("Failed to remove {:?}: {}", photo, e);
        }
    }
    if let Some(dir) = created_dir {
        if let Err(e) = fs::remove_dir(dir) {
            tracing::debug!("Leaving {:?} in place: {}", dir, e);
        }
    }
}

//! Wires config, storage, camera and terminal together for each command.

use crate::camera::{Camera, FrameSource};
use crate::cli::{report, TerminalOperator};
use crate::common::{AttendanceError, BackendKind, Config, DataDirs, Result};
use crate::core::classes::{self, ClassRequest, DeliverySummary, FinalizeOutcome};
use crate::core::detector::{FaceBox, FaceDetector, OnnxFaceDetector};
use crate::core::lbph::{LbphModel, LbphParams};
use crate::core::register::{PendingRegistration, RegistrationRequest};
use crate::core::train::{self, TrainingReport};
use crate::core::AttendanceSession;
use crate::notify::{Notifier, TelegramNotifier};
use crate::remote::RemoteStore;
use crate::storage::{Backend, ClassRecord, LocalStore, NotificationStatus, StudentRecord};
use chrono::{Duration, Local, NaiveDate};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::path::PathBuf;

/// Result of an attendance session.
#[derive(Debug)]
pub struct MarkOutcome {
    pub summary: String,
    pub newly_marked: usize,
    pub finalized: Option<FinalizeOutcome>,
}

pub fn open_backend(config: &Config, dirs: DataDirs, kind: BackendKind) -> Result<Box<dyn Backend>> {
    match kind {
        BackendKind::Local => Ok(Box::new(LocalStore::open(dirs)?)),
        BackendKind::Remote => Ok(Box::new(RemoteStore::from_config(&config.remote, dirs)?)),
    }
}

pub struct App {
    config: Config,
    dirs: DataDirs,
    backend: Box<dyn Backend>,
    notifier: Option<TelegramNotifier>,
}

impl App {
    pub fn new(config: Config, dev: bool, backend: Option<BackendKind>) -> Result<Self> {
        config.validate()?;
        let dirs = DataDirs::new(&config.storage.data_dir, dev)?;
        let kind = backend.unwrap_or(config.storage.backend);
        let backend = open_backend(&config, dirs.clone(), kind)?;
        let notifier = TelegramNotifier::from_config(&config.notify)?;
        tracing::info!("Using {} backend at {:?}", backend.name(), dirs.base_dir());

        Ok(Self { config, dirs, backend, notifier })
    }

    pub fn dirs(&self) -> &DataDirs {
        &self.dirs
    }

    fn operator(&self) -> Result<TerminalOperator> {
        let preview = &self.config.preview;
        TerminalOperator::new(preview.enabled, preview.width, preview.height)
    }

    pub fn register(&mut self, request: &RegistrationRequest) -> Result<StudentRecord> {
        let pending = PendingRegistration::prepare(request, self.backend.as_ref(), &self.dirs)?;

        let detector = OnnxFaceDetector::new(&self.config)?;
        let camera = Camera::new(&self.config.camera)?;
        let photos = {
            let mut session = camera.start_session()?;
            let mut operator = self.operator()?;
            pending.capture(&self.config.registration, &detector, &mut session, &mut operator)?
        };

        pending.complete(self.backend.as_mut(), &photos)
    }

    pub fn train(&mut self, force: bool) -> Result<TrainingReport> {
        let detector = OnnxFaceDetector::new(&self.config)?;
        let params = LbphParams::from(&self.config.recognizer);
        train::train_model(self.backend.as_mut(), &detector, &self.dirs, params, force)
    }

    /// Runs a live session. With a class id the session is bound to that
    /// class and finalizes it when the class ends.
    pub fn mark(&mut self, class_id: Option<u64>) -> Result<MarkOutcome> {
        let model = LbphModel::load(&self.dirs.model_path())?;
        let threshold = self.config.recognizer.threshold;
        let now = Local::now();

        let mut session = match class_id {
            Some(id) => {
                let class = self
                    .backend
                    .class_by_id(id)?
                    .ok_or(AttendanceError::ClassNotFound(id))?;
                AttendanceSession::for_class(
                    self.backend.as_ref(),
                    threshold,
                    class,
                    self.config.attendance.presence_ratio,
                    now,
                )?
            }
            None => AttendanceSession::new(self.backend.as_ref(), threshold, now)?,
        };

        let detector = OnnxFaceDetector::new(&self.config)?;
        let camera = Camera::new(&self.config.camera)?;
        {
            let mut frames = camera.start_session()?;
            let mut operator = self.operator()?;
            session.run(&mut frames, &mut operator, &detector, &model, self.backend.as_mut(), Local::now)?;
        }

        let finalized = match session.class() {
            Some(class) if session.is_over(Local::now()) => {
                let notifier = self.notifier.as_ref().map(|n| n as &dyn Notifier);
                Some(classes::finalize_class(self.backend.as_mut(), notifier, class.id)?)
            }
            _ => None,
        };

        Ok(MarkOutcome {
            summary: session.summary(),
            newly_marked: session.marked_this_session().len(),
            finalized,
        })
    }

    pub fn student_lines(&self) -> Result<Vec<String>> {
        Ok(report::student_lines(&self.backend.students()?))
    }

    pub fn attendance_dates(&self) -> Result<Vec<NaiveDate>> {
        self.backend.attendance_dates()
    }

    pub fn attendance_report(&self, date: NaiveDate) -> Result<String> {
        Ok(report::attendance_report(&self.backend.attendance_on(date)?))
    }

    pub fn create_class(&mut self, request: &ClassRequest) -> Result<(ClassRecord, Option<DeliverySummary>)> {
        let lead = Duration::minutes(self.config.notify.reminder_lead_minutes);
        let notifier = self.notifier.as_ref().map(|n| n as &dyn Notifier);
        classes::create_class(self.backend.as_mut(), notifier, request, lead, Local::now())
    }

    pub fn classes(&self, upcoming: bool) -> Result<Vec<ClassRecord>> {
        self.backend.classes(upcoming.then(Local::now))
    }

    /// `None` when no bot token is configured.
    pub fn notify_due(&mut self) -> Result<Option<Vec<(u64, NotificationStatus)>>> {
        let Some(notifier) = self.notifier.as_ref() else {
            return Ok(None);
        };
        classes::notify_due(self.backend.as_mut(), notifier, Local::now()).map(Some)
    }

    pub fn finalize_class(&mut self, class_id: u64) -> Result<FinalizeOutcome> {
        let notifier = self.notifier.as_ref().map(|n| n as &dyn Notifier);
        classes::finalize_class(self.backend.as_mut(), notifier, class_id)
    }

    /// Grabs one frame, draws any detected faces and saves it to the
    /// captures directory.
    pub fn test_camera(&self) -> Result<(PathBuf, usize)> {
        let camera = Camera::new(&self.config.camera)?;
        let frame = camera.start_session()?.next_frame()?;
        tracing::info!("Captured {}x{} frame from /dev/video{}", frame.width(), frame.height(), camera.index());

        let faces = match OnnxFaceDetector::new(&self.config) {
            Ok(detector) => detector.detect(&frame)?,
            Err(e) => {
                tracing::warn!("Detector unavailable, saving the raw frame: {}", e);
                Vec::new()
            }
        };

        let path = self.dirs.capture_path("camera_test");
        annotate(&frame, &faces).save(&path)?;
        Ok((path, faces.len()))
    }
}

/// Frame with a green box around each face.
pub fn annotate(frame: &DynamicImage, faces: &[FaceBox]) -> RgbImage {
    let mut rgb = frame.to_rgb8();
    for face in faces {
        if let Some((x, y, w, h)) = face.clamped_rect(rgb.width(), rgb.height()) {
            draw_hollow_rect_mut(&mut rgb, Rect::at(x as i32, y as i32).of_size(w, h), Rgb([0, 255, 0]));
        }
    }
    rgb
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn annotate_draws_box_edges_only() {
        let frame = DynamicImage::ImageLuma8(GrayImage::from_pixel(20, 20, Luma([0])));
        let face = FaceBox { x1: 5.0, y1: 5.0, x2: 15.0, y2: 15.0, confidence: 0.9 };
        let out = annotate(&frame, &[face]);

        assert_eq!(out.get_pixel(5, 5), &Rgb([0, 255, 0]));
        assert_eq!(out.get_pixel(14, 10), &Rgb([0, 255, 0]));
        assert_eq!(out.get_pixel(10, 10), &Rgb([0, 0, 0]));
    }

    #[test]
    fn local_backend_opens_without_credentials() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = tmp.path().to_path_buf();

        let app = App::new(config.clone(), false, None).unwrap();
        assert!(app.student_lines().unwrap().is_empty());
        assert!(matches!(
            App::new(config, false, Some(BackendKind::Remote)),
            Err(AttendanceError::Config(_))
        ));
    }
}

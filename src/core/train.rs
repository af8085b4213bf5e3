use crate::common::{AttendanceError, DataDirs, Result};
use crate::core::detector::{crop_face, FaceDetector};
use crate::core::lbph::{LbphModel, LbphParams};
use crate::storage::{Backend, StudentRecord};
use chrono::Local;
use image::{DynamicImage, GrayImage};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingReport {
    pub samples: usize,
    pub students_used: usize,
    /// Students flagged as trained by this run.
    pub newly_trained: Vec<String>,
    /// Students that contributed no face.
    pub without_faces: Vec<String>,
}

/// Rebuilds the LBPH model from every student's photos.
///
/// Refuses with `AlreadyTrained` when all students are flagged and the model
/// file is present, unless `force` is set. Every face found in a photo
/// becomes a sample labelled with the student's id.
pub fn train_model(
    backend: &mut dyn Backend,
    detector: &dyn FaceDetector,
    dirs: &DataDirs,
    params: LbphParams,
    force: bool,
) -> Result<TrainingReport> {
    let students = backend.students()?;
    if students.is_empty() {
        return Err(AttendanceError::NoStudents);
    }

    let model_path = dirs.model_path();
    let all_flagged = students.iter().all(|s| s.model_trained);
    if all_flagged && !force {
        if model_path.exists() {
            return Err(AttendanceError::AlreadyTrained);
        }
        tracing::warn!("All students are flagged as trained but {:?} is missing, rebuilding", model_path);
    }

    let mut report = TrainingReport::default();
    let mut faces: Vec<(GrayImage, u32)> = Vec::new();

    for student in &students {
        let fetched = backend.prepare_photos(student)?;
        if fetched > 0 {
            tracing::info!("Downloaded {} photos for {}", fetched, student.reg_number);
        }

        let student_faces = collect_faces(student, detector)?;
        if student_faces.is_empty() {
            tracing::warn!("No faces found for {} ({})", student.name, student.reg_number);
            report.without_faces.push(student.reg_number.clone());
            continue;
        }

        tracing::debug!("{} faces for {}", student_faces.len(), student.reg_number);
        report.students_used += 1;
        if !student.model_trained {
            report.newly_trained.push(student.reg_number.clone());
        }
        faces.extend(student_faces.into_iter().map(|face| (face, student.id)));
    }

    if faces.is_empty() {
        return Err(AttendanceError::NoFacesFound);
    }

    let model = LbphModel::train(params, &faces)?;
    fs::create_dir_all(dirs.models_dir())?;
    model.save(&model_path)?;
    report.samples = model.sample_count();
    tracing::info!("Saved model with {} samples to {:?}", report.samples, model_path);

    if !report.newly_trained.is_empty() {
        backend.mark_trained(&report.newly_trained, Local::now())?;
    }

    Ok(report)
}

fn collect_faces(student: &StudentRecord, detector: &dyn FaceDetector) -> Result<Vec<GrayImage>> {
    let mut faces = Vec::new();

    for path in photo_files(&student.photo_dir)? {
        let gray = match image::open(&path) {
            Ok(img) => img.to_luma8(),
            Err(e) => {
                tracing::warn!("Skipping unreadable photo {:?}: {}", path, e);
                continue;
            }
        };

        let boxes = match detector.detect(&DynamicImage::ImageLuma8(gray.clone())) {
            Ok(boxes) => boxes,
            Err(e) => {
                tracing::warn!("Face detection failed on {:?}: {}", path, e);
                continue;
            }
        };

        faces.extend(boxes.iter().filter_map(|face| crop_face(&gray, face)));
    }

    Ok(faces)
}

/// `*.jpg` files in `dir`, sorted by name. A missing directory has none.
pub fn photo_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg"))
        })
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::lbph::FaceRecognizer;
    use crate::core::testing::{dark_frame, face_frame, ThresholdDetector};
    use crate::storage::LocalStore;
    use chrono::TimeZone;

    fn setup() -> (tempfile::TempDir, DataDirs, LocalStore) {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = DataDirs::new(tmp.path(), false).unwrap();
        let store = LocalStore::open(dirs.clone()).unwrap();
        (tmp, dirs, store)
    }

    fn add_student(store: &mut LocalStore, dirs: &DataDirs, id: u32, reg: &str, frames: &[DynamicImage]) {
        let photo_dir = dirs.student_photo_dir(reg, "Student");
        fs::create_dir_all(&photo_dir).unwrap();
        for (i, frame) in frames.iter().enumerate() {
            frame.to_rgb8().save(photo_dir.join(format!("photo_{}.jpg", i + 1))).unwrap();
        }
        let record = StudentRecord {
            id,
            name: "Student".into(),
            reg_number: reg.into(),
            photo_dir,
            registered_date: Local.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
            telegram_id: None,
            model_trained: false,
            model_trained_at: None,
            profile_photo_url: None,
        };
        store.save_student(&record, &[]).unwrap();
    }

    #[test]
    fn trains_and_flags_students() {
        let (_tmp, dirs, mut store) = setup();
        add_student(&mut store, &dirs, 1, "R1", &[face_frame(2), face_frame(2)]);
        add_student(&mut store, &dirs, 2, "R2", &[face_frame(8)]);

        let report = train_model(&mut store, &ThresholdDetector, &dirs, LbphParams::default(), false).unwrap();
        assert_eq!(report.samples, 3);
        assert_eq!(report.students_used, 2);
        assert_eq!(report.newly_trained, vec!["R1".to_string(), "R2".to_string()]);
        assert!(store.students().unwrap().iter().all(|s| s.model_trained && s.model_trained_at.is_some()));

        let model = LbphModel::load(&dirs.model_path()).unwrap();
        assert_eq!(model.labels(), vec![1, 2]);

        let query = crop_face(&face_frame(8).to_luma8(), &ThresholdDetector.detect(&face_frame(8)).unwrap()[0]).unwrap();
        assert_eq!(model.predict(&query).unwrap().label, 2);
    }

    #[test]
    fn second_run_is_refused_until_forced_or_model_lost() {
        let (_tmp, dirs, mut store) = setup();
        add_student(&mut store, &dirs, 1, "R1", &[face_frame(4)]);
        train_model(&mut store, &ThresholdDetector, &dirs, LbphParams::default(), false).unwrap();

        let again = train_model(&mut store, &ThresholdDetector, &dirs, LbphParams::default(), false);
        assert!(matches!(again, Err(AttendanceError::AlreadyTrained)));

        let forced = train_model(&mut store, &ThresholdDetector, &dirs, LbphParams::default(), true).unwrap();
        assert!(forced.newly_trained.is_empty());

        fs::remove_file(dirs.model_path()).unwrap();
        train_model(&mut store, &ThresholdDetector, &dirs, LbphParams::default(), false).unwrap();
        assert!(dirs.model_path().exists());
    }

    #[test]
    fn no_students_or_no_faces_is_an_error() {
        let (_tmp, dirs, mut store) = setup();
        assert!(matches!(
            train_model(&mut store, &ThresholdDetector, &dirs, LbphParams::default(), false),
            Err(AttendanceError::NoStudents)
        ));

        add_student(&mut store, &dirs, 1, "R1", &[dark_frame()]);
        assert!(matches!(
            train_model(&mut store, &ThresholdDetector, &dirs, LbphParams::default(), false),
            Err(AttendanceError::NoFacesFound)
        ));
        assert!(!store.find_student("R1").unwrap().unwrap().model_trained);
    }

    #[test]
    fn students_without_faces_stay_untrained() {
        let (_tmp, dirs, mut store) = setup();
        add_student(&mut store, &dirs, 1, "R1", &[face_frame(4)]);
        add_student(&mut store, &dirs, 2, "R2", &[dark_frame()]);

        let report = train_model(&mut store, &ThresholdDetector, &dirs, LbphParams::default(), false).unwrap();
        assert_eq!(report.without_faces, vec!["R2".to_string()]);
        assert!(!store.find_student("R2").unwrap().unwrap().model_trained);
    }

    #[test]
    fn photo_files_only_lists_jpgs_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["photo_2.jpg", "photo_1.JPG", "notes.txt"] {
            fs::write(tmp.path().join(name), b"x").unwrap();
        }
        let names: Vec<String> = photo_files(tmp.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["photo_1.JPG", "photo_2.jpg"]);
        assert!(photo_files(&tmp.path().join("missing")).unwrap().is_empty());
    }
}

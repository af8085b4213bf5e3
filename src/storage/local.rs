use crate::common::{AttendanceError, DataDirs, Result};
use crate::common::paths::parse_attendance_file_name;
use crate::storage::{
    next_id, AttendanceDay, AttendanceEntry, Backend, ClassRecord, ClassUpdate, NewClass,
    StudentRecord,
};
use chrono::{DateTime, Local, NaiveDate};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// JSON-file backend. Students are cached in memory and written back on
/// every change; attendance and classes are read from disk on demand.
pub struct LocalStore {
    dirs: DataDirs,
    students: BTreeMap<String, StudentRecord>,
}

impl LocalStore {
    pub fn open(dirs: DataDirs) -> Result<Self> {
        let students = read_json_or_default(&dirs.students_db_path())?;
        Ok(Self { dirs, students })
    }

    pub fn dirs(&self) -> &DataDirs {
        &self.dirs
    }

    fn save_students_db(&self) -> Result<()> {
        write_json(&self.dirs.students_db_path(), &self.students)
    }

    fn load_classes(&self) -> Result<Vec<ClassRecord>> {
        read_json_or_default(&self.dirs.classes_db_path())
    }

    fn save_classes(&self, classes: &[ClassRecord]) -> Result<()> {
        write_json(&self.dirs.classes_db_path(), &classes)
    }
}

impl Backend for LocalStore {
    fn name(&self) -> &'static str {
        "local"
    }

    fn students(&self) -> Result<Vec<StudentRecord>> {
        Ok(self.students.values().cloned().collect())
    }

    fn find_student(&self, reg_number: &str) -> Result<Option<StudentRecord>> {
        Ok(self.students.get(reg_number).cloned())
    }

    fn next_student_id(&self) -> Result<u32> {
        Ok(next_id(self.students.values().map(|s| s.id)))
    }

    fn save_student(&mut self, student: &StudentRecord, _photos: &[PathBuf]) -> Result<StudentRecord> {
        if self.students.contains_key(&student.reg_number) {
            return Err(AttendanceError::DuplicateRegistration(student.reg_number.clone()));
        }
        self.students.insert(student.reg_number.clone(), student.clone());
        self.save_students_db()?;
        tracing::info!("Saved student {} ({}) to local store", student.name, student.reg_number);
        Ok(student.clone())
    }

    fn mark_trained(&mut self, reg_numbers: &[String], at: DateTime<Local>) -> Result<()> {
        for reg in reg_numbers {
            match self.students.get_mut(reg) {
                Some(student) => {
                    student.model_trained = true;
                    student.model_trained_at = Some(at);
                }
                None => return Err(AttendanceError::StudentNotFound(reg.clone())),
            }
        }
        self.save_students_db()
    }

    fn attendance_on(&self, date: NaiveDate) -> Result<AttendanceDay> {
        let entries = read_json_or_default(&self.dirs.attendance_file(date))?;
        Ok(AttendanceDay { date, entries })
    }

    fn record_attendance(&mut self, date: NaiveDate, entry: &AttendanceEntry) -> Result<bool> {
        let mut day = self.attendance_on(date)?;
        if day.is_marked(&entry.reg_number) {
            return Ok(false);
        }
        day.entries.insert(entry.reg_number.clone(), entry.clone());
        write_json(&self.dirs.attendance_file(date), &day.entries)?;
        Ok(true)
    }

    fn credit_class(&mut self, date: NaiveDate, reg_number: &str, class_id: u64) -> Result<bool> {
        let mut day = self.attendance_on(date)?;
        let Some(entry) = day.entries.get_mut(reg_number) else {
            return Err(AttendanceError::StudentNotFound(reg_number.to_string()));
        };
        if !entry.credit(class_id) {
            return Ok(false);
        }
        write_json(&self.dirs.attendance_file(date), &day.entries)?;
        Ok(true)
    }

    fn attendance_dates(&self) -> Result<Vec<NaiveDate>> {
        let mut dates = Vec::new();
        for entry in fs::read_dir(self.dirs.attendance_dir())? {
            let entry = entry?;
            if let Some(date) = entry.file_name().to_str().and_then(parse_attendance_file_name) {
                dates.push(date);
            }
        }
        dates.sort_by(|a, b| b.cmp(a));
        Ok(dates)
    }

    fn create_class(&mut self, class: &NewClass) -> Result<ClassRecord> {
        let mut classes = self.load_classes()?;
        let id = classes.iter().map(|c| c.id).max().unwrap_or(0) + 1;
        let record = ClassRecord {
            id,
            teacher_name: class.teacher_name.clone(),
            teacher_unique_id: class.teacher_unique_id.clone(),
            class_name: class.class_name.clone(),
            duration_minutes: class.duration_minutes,
            class_time: class.class_time.clone(),
            class_start_at: class.class_start_at,
            class_end_at: class.class_end_at,
            notification_status: Default::default(),
            notification_scheduled_for: None,
            notification_sent_at: None,
            attendance_notification_sent_at: None,
            attendance_notification_status: None,
        };
        classes.push(record.clone());
        self.save_classes(&classes)?;
        Ok(record)
    }

    fn classes(&self, ending_after: Option<DateTime<Local>>) -> Result<Vec<ClassRecord>> {
        let mut classes = self.load_classes()?;
        if let Some(now) = ending_after {
            classes.retain(|c| c.class_end_at >= now);
        }
        classes.sort_by_key(|c| c.class_start_at);
        Ok(classes)
    }

    fn class_by_id(&self, id: u64) -> Result<Option<ClassRecord>> {
        Ok(self.load_classes()?.into_iter().find(|c| c.id == id))
    }

    fn update_class(&mut self, id: u64, update: &ClassUpdate) -> Result<()> {
        let mut classes = self.load_classes()?;
        let class = classes
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(AttendanceError::ClassNotFound(id))?;
        update.apply(class);
        self.save_classes(&classes)
    }
}

fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let contents = fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|e| {
        AttendanceError::Storage(format!("Failed to parse {}: {}", path.display(), e))
    })
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let encoded = serde_json::to_string_pretty(value)?;
    fs::write(path, encoded)?;
    Ok(())
}

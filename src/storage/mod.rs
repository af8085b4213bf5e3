pub mod local;
pub mod model;

pub use local::LocalStore;
pub use model::{
    AttendanceDay, AttendanceEntry, AttendanceStatus, ClassRecord, ClassUpdate, NewClass,
    NotificationStatus, StudentRecord,
};

use crate::common::Result;
use chrono::{DateTime, Local, NaiveDate};
use std::path::PathBuf;

/// Persistence for students, attendance and classes.
///
/// `LocalStore` keeps everything in JSON files under the data directory,
/// `RemoteStore` talks to the REST tables and photo bucket.
pub trait Backend {
    fn name(&self) -> &'static str;

    fn students(&self) -> Result<Vec<StudentRecord>>;

    fn find_student(&self, reg_number: &str) -> Result<Option<StudentRecord>>;

    /// One past the highest id in use, starting at 1.
    fn next_student_id(&self) -> Result<u32>;

    /// Persists a fully captured student. `photos` are the local photo files
    /// in capture order. Returns the record as stored.
    fn save_student(&mut self, student: &StudentRecord, photos: &[PathBuf]) -> Result<StudentRecord>;

    fn mark_trained(&mut self, reg_numbers: &[String], at: DateTime<Local>) -> Result<()>;

    /// Makes sure the student's photos exist in `photo_dir` before training.
    /// Returns how many photos were fetched.
    fn prepare_photos(&self, _student: &StudentRecord) -> Result<usize> {
        Ok(0)
    }

    fn attendance_on(&self, date: NaiveDate) -> Result<AttendanceDay>;

    /// Stores the entry unless the student is already marked on `date`.
    /// Returns `true` when the entry was newly written.
    fn record_attendance(&mut self, date: NaiveDate, entry: &AttendanceEntry) -> Result<bool>;

    /// Credits `class_id` on a student's existing entry for `date`. Returns
    /// `true` when the entry changed.
    fn credit_class(&mut self, date: NaiveDate, reg_number: &str, class_id: u64) -> Result<bool>;

    /// Dates with at least one attendance file or row, newest first.
    fn attendance_dates(&self) -> Result<Vec<NaiveDate>>;

    fn create_class(&mut self, class: &NewClass) -> Result<ClassRecord>;

    /// Classes ordered by start. With `ending_after`, only classes whose end
    /// is at or after that instant.
    fn classes(&self, ending_after: Option<DateTime<Local>>) -> Result<Vec<ClassRecord>>;

    fn class_by_id(&self, id: u64) -> Result<Option<ClassRecord>>;

    fn update_class(&mut self, id: u64, update: &ClassUpdate) -> Result<()>;
}

pub(crate) fn next_id<I: IntoIterator<Item = u32>>(ids: I) -> u32 {
    ids.into_iter().max().unwrap_or(0) + 1
}

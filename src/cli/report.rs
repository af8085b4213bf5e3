//! Plain-text views of students, attendance and classes.

use crate::storage::{AttendanceDay, ClassRecord, StudentRecord};
use chrono::NaiveDate;

pub fn student_lines(students: &[StudentRecord]) -> Vec<String> {
    students
        .iter()
        .map(|s| {
            let trained = if s.model_trained { "trained" } else { "not trained" };
            format!("{} (ID: {}) [{}]", s.name, s.reg_number, trained)
        })
        .collect()
}

pub fn date_lines(dates: &[NaiveDate]) -> Vec<String> {
    dates.iter().map(|d| d.format("%Y-%m-%d").to_string()).collect()
}

/// `"<name> - <time>"` per entry in marking order, or `"Empty"`.
pub fn attendance_report(day: &AttendanceDay) -> String {
    if day.is_empty() {
        return "Empty".to_string();
    }
    day.chronological()
        .iter()
        .map(|e| format!("{} - {}", e.name, e.time))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn class_lines(classes: &[ClassRecord]) -> Vec<String> {
    classes
        .iter()
        .map(|c| {
            format!(
                "#{} {} ({}) {} -> {} [{} min] reminders: {}",
                c.id,
                c.class_name,
                c.teacher_name,
                c.class_start_at.format("%Y-%m-%d %H:%M"),
                c.class_end_at.format("%H:%M"),
                c.duration_minutes,
                c.notification_status,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{AttendanceEntry, AttendanceStatus};
    use chrono::{Local, TimeZone};
    use std::path::PathBuf;

    fn entry(reg: &str, name: &str, time: &str) -> AttendanceEntry {
        AttendanceEntry {
            name: name.into(),
            reg_number: reg.into(),
            time: time.into(),
            status: AttendanceStatus::Present,
            marked_at: None,
            class_id: None,
            classes_attended: Vec::new(),
        }
    }

    #[test]
    fn report_lists_entries_by_time() {
        let mut day = AttendanceDay::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        day.entries.insert("A".into(), entry("A", "Zed", "10:00:00"));
        day.entries.insert("B".into(), entry("B", "Amy", "09:30:00"));

        assert_eq!(attendance_report(&day), "Amy - 09:30:00\nZed - 10:00:00");
    }

    #[test]
    fn empty_report_says_so() {
        let day = AttendanceDay::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(attendance_report(&day), "Empty");
    }

    #[test]
    fn student_lines_show_reg_and_training() {
        let student = StudentRecord {
            id: 1,
            name: "Ann".into(),
            reg_number: "R1".into(),
            photo_dir: PathBuf::from("x"),
            registered_date: Local.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            telegram_id: None,
            model_trained: true,
            model_trained_at: None,
            profile_photo_url: None,
        };
        assert_eq!(student_lines(&[student]), vec!["Ann (ID: R1) [trained]"]);
    }
}

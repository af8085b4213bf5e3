//! Records shared by the local and remote backends.

use chrono::{DateTime, Local, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub id: u32,
    pub name: String,
    pub reg_number: String,
    pub photo_dir: PathBuf,
    pub registered_date: DateTime<Local>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_id: Option<String>,
    #[serde(default)]
    pub model_trained: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_trained_at: Option<DateTime<Local>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_photo_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttendanceStatus::Present => write!(f, "Present"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceEntry {
    pub name: String,
    pub reg_number: String,
    /// `HH:MM:SS` local time.
    pub time: String,
    pub status: AttendanceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marked_at: Option<DateTime<Local>>,
    /// Class that first marked the student today.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<u64>,
    /// Classes attended after the day's mark was already taken.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes_attended: Vec<u64>,
}

impl AttendanceEntry {
    pub fn present(student: &StudentRecord, at: DateTime<Local>, class_id: Option<u64>) -> Self {
        Self {
            name: student.name.clone(),
            reg_number: student.reg_number.clone(),
            time: at.format("%H:%M:%S").to_string(),
            status: AttendanceStatus::Present,
            marked_at: Some(at),
            class_id,
            classes_attended: Vec::new(),
        }
    }

    pub fn attended(&self, class_id: u64) -> bool {
        self.class_id == Some(class_id) || self.classes_attended.contains(&class_id)
    }

    /// Records attendance of a class on an existing entry. Returns `false`
    /// when the class was already credited.
    pub fn credit(&mut self, class_id: u64) -> bool {
        if self.attended(class_id) {
            return false;
        }
        match self.class_id {
            None => self.class_id = Some(class_id),
            Some(_) => self.classes_attended.push(class_id),
        }
        true
    }

    pub fn time_of_day(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(&self.time, "%H:%M:%S").ok()
    }
}

/// Attendance for one calendar day, keyed by registration number.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceDay {
    pub date: NaiveDate,
    pub entries: BTreeMap<String, AttendanceEntry>,
}

impl AttendanceDay {
    pub fn new(date: NaiveDate) -> Self {
        Self { date, entries: BTreeMap::new() }
    }

    pub fn is_marked(&self, reg_number: &str) -> bool {
        self.entries.contains_key(reg_number)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries ordered by time of marking.
    pub fn chronological(&self) -> Vec<&AttendanceEntry> {
        let mut entries: Vec<_> = self.entries.values().collect();
        entries.sort_by(|a, b| a.time.cmp(&b.time));
        entries
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    #[default]
    Pending,
    Scheduled,
    Sent,
    Failed,
    SkippedNoToken,
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Scheduled => "scheduled",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
            NotificationStatus::SkippedNoToken => "skipped_no_token",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassRecord {
    pub id: u64,
    pub teacher_name: String,
    pub teacher_unique_id: String,
    pub class_name: String,
    pub duration_minutes: u32,
    /// `HH:MM`, 24 hour.
    pub class_time: String,
    pub class_start_at: DateTime<Local>,
    pub class_end_at: DateTime<Local>,
    #[serde(default)]
    pub notification_status: NotificationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_scheduled_for: Option<DateTime<Local>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_sent_at: Option<DateTime<Local>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendance_notification_sent_at: Option<DateTime<Local>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendance_notification_status: Option<NotificationStatus>,
}

impl ClassRecord {
    pub fn is_active(&self, now: DateTime<Local>) -> bool {
        self.class_start_at <= now && now < self.class_end_at
    }

    pub fn contains(&self, at: DateTime<Local>) -> bool {
        self.class_start_at <= at && at <= self.class_end_at
    }
}

/// A class as entered by the operator, before it has an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewClass {
    pub teacher_name: String,
    pub teacher_unique_id: String,
    pub class_name: String,
    pub duration_minutes: u32,
    pub class_time: String,
    pub class_start_at: DateTime<Local>,
    pub class_end_at: DateTime<Local>,
}

/// Partial update applied to a stored class. Serializes to just the fields
/// that are set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClassUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_status: Option<NotificationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_scheduled_for: Option<DateTime<Local>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_sent_at: Option<DateTime<Local>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendance_notification_sent_at: Option<DateTime<Local>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendance_notification_status: Option<NotificationStatus>,
}

impl ClassUpdate {
    pub fn apply(&self, class: &mut ClassRecord) {
        if let Some(status) = self.notification_status {
            class.notification_status = status;
        }
        if let Some(at) = self.notification_scheduled_for {
            class.notification_scheduled_for = Some(at);
        }
        if let Some(at) = self.notification_sent_at {
            class.notification_sent_at = Some(at);
        }
        if let Some(at) = self.attendance_notification_sent_at {
            class.attendance_notification_sent_at = Some(at);
        }
        if let Some(status) = self.attendance_notification_status {
            class.attendance_notification_status = Some(status);
        }
    }
}

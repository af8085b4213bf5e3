//! Scheduled classes: creation, reminders and end-of-class notices.

use crate::common::{AttendanceError, Result};
use crate::notify::Notifier;
use crate::storage::{
    AttendanceStatus, Backend, ClassRecord, ClassUpdate, NewClass, NotificationStatus, StudentRecord,
};
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, TimeZone};

/// A class as typed by the operator.
#[derive(Debug, Clone)]
pub struct ClassRequest {
    pub teacher_name: String,
    pub teacher_unique_id: String,
    pub class_name: String,
    pub date: NaiveDate,
    /// `HH:MM`, 24 hour.
    pub class_time: String,
    pub duration_minutes: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliverySummary {
    pub sent: usize,
    pub failed: usize,
    pub total: usize,
    /// No bot token was configured, so nothing was attempted.
    pub skipped: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FinalizeOutcome {
    AlreadyFinalized,
    Finalized(DeliverySummary),
}

/// Parses strict `HH:MM` 24-hour time.
pub fn parse_class_time(value: &str) -> Option<NaiveTime> {
    let (h, m) = value.split_once(':')?;
    if h.len() != 2 || m.len() != 2 || !h.bytes().chain(m.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveTime::from_hms_opt(h.parse().ok()?, m.parse().ok()?, 0)
}

impl ClassRequest {
    pub fn validate(&self) -> Result<NewClass> {
        let teacher_name = self.teacher_name.trim();
        let teacher_unique_id = self.teacher_unique_id.trim();
        let class_name = self.class_name.trim();
        let class_time = self.class_time.trim();

        if teacher_name.is_empty() || teacher_unique_id.is_empty() || class_name.is_empty()
            || class_time.is_empty() || self.duration_minutes <= 0
        {
            return Err(AttendanceError::InvalidInput(
                "Teacher name, teacher unique ID, class name, duration, and time are required.".into(),
            ));
        }
        let duration_minutes = u32::try_from(self.duration_minutes)
            .map_err(|_| AttendanceError::InvalidInput("Duration is too long.".into()))?;

        let time = parse_class_time(class_time).ok_or_else(|| {
            AttendanceError::InvalidInput("Time must be in HH:MM format (24-hour).".into())
        })?;

        let class_start_at = Local
            .from_local_datetime(&self.date.and_time(time))
            .earliest()
            .ok_or_else(|| AttendanceError::InvalidInput("Invalid class start/end timestamps.".into()))?;
        let class_end_at = class_start_at + Duration::minutes(self.duration_minutes);
        if class_end_at <= class_start_at {
            return Err(AttendanceError::InvalidInput(
                "Class end time must be after class start time.".into(),
            ));
        }

        Ok(NewClass {
            teacher_name: teacher_name.to_string(),
            teacher_unique_id: teacher_unique_id.to_string(),
            class_name: class_name.to_string(),
            duration_minutes,
            class_time: class_time.to_string(),
            class_start_at,
            class_end_at,
        })
    }
}

fn local_stamp(at: DateTime<Local>) -> String {
    at.format("%Y-%m-%d %H:%M").to_string()
}

pub fn reminder_text(class: &ClassRecord, student: &StudentRecord) -> String {
    format!(
        "Class Reminder\nStudent: {} ({})\nClass: {}\nTeacher: {}\nStart: {}\nEnd: {}\nDuration: {} min",
        student.name,
        student.reg_number,
        class.class_name,
        class.teacher_name,
        local_stamp(class.class_start_at),
        local_stamp(class.class_end_at),
        class.duration_minutes,
    )
}

pub fn completion_text(class: &ClassRecord, present: bool) -> String {
    let status = if present {
        "Your attendance has been marked as Present."
    } else {
        "You were marked Absent."
    };
    format!(
        "Class Completed\nClass: {}\nTeacher: {}\nStart: {}\nEnd: {}\nStatus: {}",
        class.class_name,
        class.teacher_name,
        local_stamp(class.class_start_at),
        local_stamp(class.class_end_at),
        status,
    )
}

/// Sends one message per student. Students without a Telegram id and
/// failed sends both count as failures.
fn deliver<F>(notifier: &dyn Notifier, students: &[StudentRecord], text_for: F) -> DeliverySummary
where
    F: Fn(&StudentRecord) -> String,
{
    let mut summary = DeliverySummary { total: students.len(), ..DeliverySummary::default() };

    for student in students {
        let Some(chat_id) = student.telegram_id.as_deref().map(str::trim).filter(|id| !id.is_empty()) else {
            summary.failed += 1;
            continue;
        };

        match notifier.send(chat_id, &text_for(student)) {
            Ok(()) => summary.sent += 1,
            Err(e) => {
                tracing::warn!("Failed to notify {}: {}", student.reg_number, e);
                summary.failed += 1;
            }
        }
    }

    summary
}

pub fn send_reminders(backend: &dyn Backend, notifier: &dyn Notifier, class: &ClassRecord) -> Result<DeliverySummary> {
    let students = backend.students()?;
    let summary = deliver(notifier, &students, |student| reminder_text(class, student));
    tracing::info!(
        "Class #{} reminders: {} sent, {} failed of {}",
        class.id, summary.sent, summary.failed, summary.total
    );
    Ok(summary)
}

/// Stores a new class and plans its reminder: sent right away when the class
/// starts within `lead`, otherwise scheduled for `start - lead`.
pub fn create_class(
    backend: &mut dyn Backend,
    notifier: Option<&dyn Notifier>,
    request: &ClassRequest,
    lead: Duration,
    now: DateTime<Local>,
) -> Result<(ClassRecord, Option<DeliverySummary>)> {
    let new_class = request.validate()?;
    let mut class = backend.create_class(&new_class)?;
    tracing::info!("Created class #{} {}", class.id, class.class_name);

    let mut delivered = None;
    let update = match notifier {
        None => ClassUpdate {
            notification_status: Some(NotificationStatus::SkippedNoToken),
            ..ClassUpdate::default()
        },
        Some(notifier) if class.class_start_at - now <= lead => {
            delivered = Some(send_reminders(backend, notifier, &class)?);
            ClassUpdate {
                notification_status: Some(NotificationStatus::Sent),
                notification_sent_at: Some(Local::now()),
                ..ClassUpdate::default()
            }
        }
        Some(_) => ClassUpdate {
            notification_status: Some(NotificationStatus::Scheduled),
            notification_scheduled_for: Some(class.class_start_at - lead),
            ..ClassUpdate::default()
        },
    };

    backend.update_class(class.id, &update)?;
    update.apply(&mut class);
    Ok((class, delivered))
}

/// Sends reminders for every scheduled class whose time has come. Returns
/// the classes that were processed with their new status.
pub fn notify_due(
    backend: &mut dyn Backend,
    notifier: &dyn Notifier,
    now: DateTime<Local>,
) -> Result<Vec<(u64, NotificationStatus)>> {
    let due: Vec<ClassRecord> = backend
        .classes(None)?
        .into_iter()
        .filter(|c| c.notification_status == NotificationStatus::Scheduled)
        .filter(|c| c.notification_scheduled_for.is_some_and(|at| at <= now))
        .collect();

    let mut processed = Vec::with_capacity(due.len());
    for class in due {
        let update = match send_reminders(backend, notifier, &class) {
            Ok(_) => ClassUpdate {
                notification_status: Some(NotificationStatus::Sent),
                notification_sent_at: Some(Local::now()),
                ..ClassUpdate::default()
            },
            Err(e) => {
                tracing::error!("Reminders for class #{} failed: {}", class.id, e);
                ClassUpdate {
                    notification_status: Some(NotificationStatus::Failed),
                    ..ClassUpdate::default()
                }
            }
        };
        backend.update_class(class.id, &update)?;
        processed.push((class.id, update.notification_status.unwrap_or_default()));
    }

    Ok(processed)
}

/// Registration numbers counted present for `class`.
pub fn present_for_class(backend: &dyn Backend, class: &ClassRecord) -> Result<Vec<String>> {
    let day = backend.attendance_on(class.class_start_at.date_naive())?;
    Ok(day
        .entries
        .values()
        .filter(|e| e.status == AttendanceStatus::Present)
        .filter(|e| e.attended(class.id) || e.marked_at.is_some_and(|at| class.contains(at)))
        .map(|e| e.reg_number.clone())
        .collect())
}

/// Tells every student whether they attended, once per class.
pub fn finalize_class(
    backend: &mut dyn Backend,
    notifier: Option<&dyn Notifier>,
    class_id: u64,
) -> Result<FinalizeOutcome> {
    let class = backend
        .class_by_id(class_id)?
        .ok_or(AttendanceError::ClassNotFound(class_id))?;
    if class.attendance_notification_sent_at.is_some() {
        return Ok(FinalizeOutcome::AlreadyFinalized);
    }

    let present = present_for_class(backend, &class)?;
    let students = backend.students()?;
    let summary = match notifier {
        Some(notifier) => deliver(notifier, &students, |student| {
            completion_text(&class, present.contains(&student.reg_number))
        }),
        None => DeliverySummary { total: students.len(), skipped: true, ..DeliverySummary::default() },
    };

    let status = if notifier.is_some() { NotificationStatus::Sent } else { NotificationStatus::SkippedNoToken };
    backend.update_class(class_id, &ClassUpdate {
        attendance_notification_sent_at: Some(Local::now()),
        attendance_notification_status: Some(status),
        ..ClassUpdate::default()
    })?;

    tracing::info!(
        "Finalized class #{}: {} present of {}, {} notices sent",
        class_id, present.len(), summary.total, summary.sent
    );
    Ok(FinalizeOutcome::Finalized(summary))
}

use crate::camera::FrameSource;
use crate::common::{AttendanceError, Result};
use crate::core::detector::{crop_face, FaceDetector};
use crate::core::lbph::FaceRecognizer;
use crate::core::operator::{Operator, OperatorKey, Overlay, OverlayKind};
use crate::storage::{AttendanceDay, AttendanceEntry, Backend, ClassRecord, StudentRecord};
use chrono::{DateTime, Duration, Local};
use std::collections::HashMap;

/// Presence tracking for a session bound to a class.
#[derive(Debug)]
struct ClassPresence {
    class: ClassRecord,
    required: Duration,
    seen: HashMap<String, Duration>,
    last_seen: HashMap<String, DateTime<Local>>,
}

impl ClassPresence {
    /// Adds the time since the previous frame when the student was also
    /// recognised in it. Returns the accumulated presence.
    fn observe(&mut self, reg_number: &str, previous_frame: Option<DateTime<Local>>, now: DateTime<Local>) -> Duration {
        let total = self.seen.entry(reg_number.to_string()).or_insert_with(Duration::zero);
        if let (Some(prev), Some(last)) = (previous_frame, self.last_seen.get(reg_number)) {
            if *last == prev && now > prev {
                *total = *total + (now - prev);
            }
        }
        self.last_seen.insert(reg_number.to_string(), now);
        *total
    }
}

/// Minutes a student must be seen before a class marks them present.
pub fn required_presence_minutes(duration_minutes: u32, presence_ratio: f64) -> i64 {
    ((duration_minutes as f64 * presence_ratio).floor() as i64).max(1)
}

/// A running attendance session: recognises faces frame by frame and
/// records each student once per day.
pub struct AttendanceSession {
    students: HashMap<u32, StudentRecord>,
    today: AttendanceDay,
    threshold: f64,
    class: Option<ClassPresence>,
    last_frame: Option<DateTime<Local>>,
    marked_this_session: Vec<String>,
}

impl AttendanceSession {
    pub fn new(backend: &dyn Backend, threshold: f64, now: DateTime<Local>) -> Result<Self> {
        let students = backend
            .students()?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();
        let today = backend.attendance_on(now.date_naive())?;
        tracing::info!("Attendance session started, {} already present today", today.len());

        Ok(Self {
            students,
            today,
            threshold,
            class: None,
            last_frame: None,
            marked_this_session: Vec::new(),
        })
    }

    /// Binds the session to a class that is in progress at `now`.
    pub fn for_class(
        backend: &dyn Backend,
        threshold: f64,
        class: ClassRecord,
        presence_ratio: f64,
        now: DateTime<Local>,
    ) -> Result<Self> {
        if !class.is_active(now) {
            return Err(AttendanceError::InvalidInput(format!(
                "Class #{} is not in session (runs {} to {})",
                class.id,
                class.class_start_at.format("%Y-%m-%d %H:%M"),
                class.class_end_at.format("%H:%M"),
            )));
        }

        let required = Duration::minutes(required_presence_minutes(class.duration_minutes, presence_ratio));
        tracing::info!(
            "Class #{} {}: students need {} min of presence",
            class.id, class.class_name, required.num_minutes()
        );

        let mut session = Self::new(backend, threshold, now)?;
        session.class = Some(ClassPresence {
            class,
            required,
            seen: HashMap::new(),
            last_seen: HashMap::new(),
        });
        Ok(session)
    }

    pub fn class(&self) -> Option<&ClassRecord> {
        self.class.as_ref().map(|c| &c.class)
    }

    pub fn present_today(&self) -> usize {
        self.today.len()
    }

    pub fn marked_this_session(&self) -> &[String] {
        &self.marked_this_session
    }

    pub fn summary(&self) -> String {
        format!("{} present today.", self.present_today())
    }

    /// True once a class-bound session has reached the class end.
    pub fn is_over(&self, now: DateTime<Local>) -> bool {
        self.class.as_ref().is_some_and(|c| now >= c.class.class_end_at)
    }

    /// Recognises every face in `frame`, records newly present students and
    /// returns the overlays for the preview.
    pub fn process_frame(
        &mut self,
        frame: &image::DynamicImage,
        detector: &dyn FaceDetector,
        recognizer: &dyn FaceRecognizer,
        backend: &mut dyn Backend,
        now: DateTime<Local>,
    ) -> Result<Vec<Overlay>> {
        if now.date_naive() != self.today.date {
            tracing::info!("Date changed, loading attendance for {}", now.date_naive());
            self.today = backend.attendance_on(now.date_naive())?;
        }

        let faces = detector.detect(frame).unwrap_or_else(|e| {
            tracing::warn!("Face detection failed: {}", e);
            Vec::new()
        });
        let gray = frame.to_luma8();
        let previous_frame = self.last_frame.replace(now);
        let mut overlays = Vec::with_capacity(faces.len());

        for face in faces {
            let student = crop_face(&gray, &face)
                .and_then(|crop| recognizer.predict(&crop))
                .filter(|p| p.distance < self.threshold)
                .and_then(|p| self.students.get(&p.label).cloned());

            let Some(student) = student else {
                overlays.push(Overlay { face, label: Some("Unknown".to_string()), kind: OverlayKind::Unknown });
                continue;
            };

            let label = self.observe(&student, previous_frame, now, backend)?;
            overlays.push(Overlay { face, label: Some(label), kind: OverlayKind::Recognized });
        }

        Ok(overlays)
    }

    /// Outside a class a recognised student is marked once per day. In a
    /// class they must first reach the required presence; students already
    /// marked earlier that day then get the class credited on their entry.
    fn observe(
        &mut self,
        student: &StudentRecord,
        previous_frame: Option<DateTime<Local>>,
        now: DateTime<Local>,
        backend: &mut dyn Backend,
    ) -> Result<String> {
        let reg_number = &student.reg_number;
        let marked = format!("{} (Marked)", student.name);

        let Some(presence) = self.class.as_mut() else {
            if !self.today.is_marked(reg_number) {
                self.mark_present(student, now, None, backend)?;
            }
            return Ok(marked);
        };

        let class_id = presence.class.id;
        if self.today.entries.get(reg_number).is_some_and(|e| e.attended(class_id)) {
            return Ok(marked);
        }

        let seen = presence.observe(reg_number, previous_frame, now);
        if seen < presence.required {
            return Ok(format!(
                "{} ({}/{} min)",
                student.name,
                seen.num_minutes(),
                presence.required.num_minutes()
            ));
        }

        match self.today.entries.get_mut(reg_number) {
            Some(entry) => {
                backend.credit_class(self.today.date, reg_number, class_id)?;
                entry.credit(class_id);
                tracing::info!("Credited class #{} to {} ({})", class_id, student.name, reg_number);
            }
            None => self.mark_present(student, now, Some(class_id), backend)?,
        }
        Ok(marked)
    }

    fn mark_present(
        &mut self,
        student: &StudentRecord,
        now: DateTime<Local>,
        class_id: Option<u64>,
        backend: &mut dyn Backend,
    ) -> Result<()> {
        let entry = AttendanceEntry::present(student, now, class_id);
        if backend.record_attendance(self.today.date, &entry)? {
            tracing::info!("Marked {} ({}) present at {}", student.name, student.reg_number, entry.time);
            self.marked_this_session.push(student.reg_number.clone());
            self.today.entries.insert(student.reg_number.clone(), entry);
        } else {
            tracing::debug!("{} was already marked today", student.reg_number);
            // Another session got there first; pick up the stored entry.
            if let Some(stored) = backend.attendance_on(self.today.date)?.entries.remove(&student.reg_number) {
                self.today.entries.insert(student.reg_number.clone(), stored);
            }
            if let Some(id) = class_id {
                backend.credit_class(self.today.date, &student.reg_number, id)?;
                if let Some(entry) = self.today.entries.get_mut(&student.reg_number) {
                    entry.credit(id);
                }
            }
        }
        Ok(())
    }

    /// Runs until the operator presses ESC or, for a class, the class ends.
    /// `clock` supplies the timestamp of each frame.
    pub fn run<C>(
        &mut self,
        frames: &mut dyn FrameSource,
        operator: &mut dyn Operator,
        detector: &dyn FaceDetector,
        recognizer: &dyn FaceRecognizer,
        backend: &mut dyn Backend,
        mut clock: C,
    ) -> Result<usize>
    where
        C: FnMut() -> DateTime<Local>,
    {
        loop {
            let now = clock();
            if self.is_over(now) {
                tracing::info!("Class ended, stopping session");
                break;
            }

            let frame = frames.next_frame()?;
            let overlays = self.process_frame(&frame, detector, recognizer, backend, now)?;
            let status = format!("Present today: {}  ESC to finish", self.present_today());
            operator.show(&frame, &overlays, &status)?;

            if operator.poll_key()? == OperatorKey::Quit {
                break;
            }
        }

        Ok(self.present_today())
    }
}

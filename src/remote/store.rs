use crate::common::{AttendanceError, DataDirs, Result};
use crate::common::config::RemoteConfig;
use crate::common::paths::student_folder_name;
use crate::core::train::photo_files;
use crate::remote::client::{in_filter, Resolution, SupabaseClient};
use crate::storage::{
    AttendanceDay, AttendanceEntry, AttendanceStatus, Backend, ClassRecord, ClassUpdate, NewClass,
    NotificationStatus, StudentRecord,
};
use chrono::{DateTime, Local, NaiveDate, SecondsFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const MAX_TRAINING_PHOTOS: usize = 6;
const ATTENDANCE_LIST_LIMIT: &str = "300";
const CLASS_LIST_LIMIT: &str = "200";

#[derive(Debug, Serialize, Deserialize)]
struct StudentRow {
    student_id: u32,
    name: String,
    reg_number: String,
    #[serde(default)]
    telegram_id: Option<String>,
    #[serde(default)]
    photo_dir: Option<String>,
    #[serde(default)]
    profile_photo_path: Option<String>,
    #[serde(default)]
    profile_photo_url: Option<String>,
    #[serde(default)]
    registered_date: Option<DateTime<Local>>,
    #[serde(default)]
    model_trained: Option<bool>,
    #[serde(default)]
    model_trained_at: Option<DateTime<Local>>,
}

#[derive(Debug, Deserialize)]
struct StudentIdRow {
    student_id: u32,
}

#[derive(Debug, Serialize)]
struct PhotoRow<'a> {
    reg_number: &'a str,
    student_name: &'a str,
    photo_no: usize,
    storage_path: String,
    photo_url: String,
    captured_at: DateTime<Local>,
}

#[derive(Debug, Deserialize)]
struct PhotoUrlRow {
    #[serde(default)]
    photo_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AttendanceRow {
    attendance_date: NaiveDate,
    reg_number: String,
    name: String,
    time: String,
    status: AttendanceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    marked_at: Option<DateTime<Local>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    class_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    classes_attended: Vec<u64>,
}

#[derive(Debug, Serialize)]
struct ClassCreditPatch<'a> {
    class_id: Option<u64>,
    classes_attended: &'a [u64],
}

#[derive(Debug, Deserialize)]
struct AttendanceDateRow {
    attendance_date: NaiveDate,
}

#[derive(Debug, Serialize)]
struct NewClassRow<'a> {
    teacher_name: &'a str,
    teacher_unique_id: &'a str,
    class_name: &'a str,
    duration_minutes: u32,
    class_time: &'a str,
    class_start_at: DateTime<Local>,
    class_end_at: DateTime<Local>,
    notification_status: NotificationStatus,
}

#[derive(Debug, Serialize)]
struct TrainedPatch {
    model_trained: bool,
    model_trained_at: DateTime<Local>,
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{}", value)
}

/// Backend over the REST tables and the photo bucket. Photos are cached
/// locally under the data directory so training can read them from disk.
pub struct RemoteStore {
    client: SupabaseClient,
    config: RemoteConfig,
    dirs: DataDirs,
}

impl RemoteStore {
    pub fn new(client: SupabaseClient, config: RemoteConfig, dirs: DataDirs) -> Self {
        Self { client, config, dirs }
    }

    pub fn from_config(config: &RemoteConfig, dirs: DataDirs) -> Result<Self> {
        Ok(Self::new(SupabaseClient::from_config(config)?, config.clone(), dirs))
    }

    /// The cache folder keeps the name chosen at registration, which may
    /// carry a suffix when sanitized names collided.
    fn photo_dir_for(&self, row: &StudentRow) -> PathBuf {
        row.photo_dir
            .as_deref()
            .and_then(|dir| Path::new(dir).file_name())
            .map(|folder| self.dirs.students_dir().join(folder))
            .unwrap_or_else(|| self.dirs.student_photo_dir(&row.reg_number, &row.name))
    }

    fn to_record(&self, row: StudentRow) -> StudentRecord {
        StudentRecord {
            id: row.student_id,
            photo_dir: self.photo_dir_for(&row),
            name: row.name,
            reg_number: row.reg_number,
            registered_date: row.registered_date.unwrap_or_else(Local::now),
            telegram_id: row.telegram_id.filter(|id| !id.trim().is_empty()),
            model_trained: row.model_trained.unwrap_or(false),
            model_trained_at: row.model_trained_at,
            profile_photo_url: row.profile_photo_url,
        }
    }

    fn photo_urls(&self, student: &StudentRecord) -> Result<Vec<String>> {
        let rows: Vec<PhotoUrlRow> = self.client.select(&self.config.photos_table, &[
            ("select", "photo_url,photo_no".to_string()),
            ("reg_number", eq(&student.reg_number)),
            ("order", "photo_no.asc".to_string()),
        ])?;

        let mut urls: Vec<String> = rows
            .into_iter()
            .filter_map(|r| r.photo_url)
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .collect();
        if urls.is_empty() {
            urls.extend(student.profile_photo_url.clone());
        }
        urls.truncate(MAX_TRAINING_PHOTOS);
        Ok(urls)
    }
}

impl Backend for RemoteStore {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn students(&self) -> Result<Vec<StudentRecord>> {
        let rows: Vec<StudentRow> = self.client.select(&self.config.students_table, &[
            ("select", "*".to_string()),
            ("order", "student_id.asc".to_string()),
        ])?;
        Ok(rows.into_iter().map(|row| self.to_record(row)).collect())
    }

    fn find_student(&self, reg_number: &str) -> Result<Option<StudentRecord>> {
        let rows: Vec<StudentRow> = self.client.select(&self.config.students_table, &[
            ("select", "*".to_string()),
            ("reg_number", eq(reg_number)),
            ("limit", "1".to_string()),
        ])?;
        Ok(rows.into_iter().next().map(|row| self.to_record(row)))
    }

    fn next_student_id(&self) -> Result<u32> {
        let rows: Vec<StudentIdRow> = self.client.select(&self.config.students_table, &[
            ("select", "student_id".to_string()),
            ("order", "student_id.desc".to_string()),
            ("limit", "1".to_string()),
        ])?;
        Ok(crate::storage::next_id(rows.into_iter().map(|r| r.student_id)))
    }

    fn save_student(&mut self, student: &StudentRecord, photos: &[PathBuf]) -> Result<StudentRecord> {
        let folder = student_folder_name(&student.reg_number, &student.name);
        let captured_at = Local::now();
        let mut photo_rows = Vec::with_capacity(photos.len());

        for (i, photo) in photos.iter().enumerate() {
            let storage_path = format!("{}/photo_{}_{}.jpg", folder, i + 1, Local::now().timestamp_millis());
            self.client.upload(&self.config.photos_bucket, &storage_path, fs::read(photo)?, "image/jpeg")?;
            tracing::debug!("Uploaded {:?} to {}", photo, storage_path);

            photo_rows.push(PhotoRow {
                reg_number: &student.reg_number,
                student_name: &student.name,
                photo_no: i + 1,
                photo_url: self.client.public_url(&self.config.photos_bucket, &storage_path),
                storage_path,
                captured_at,
            });
        }

        let row = StudentRow {
            student_id: student.id,
            name: student.name.clone(),
            reg_number: student.reg_number.clone(),
            telegram_id: student.telegram_id.clone(),
            photo_dir: Some(student.photo_dir.display().to_string()),
            profile_photo_path: photo_rows.first().map(|p| p.storage_path.clone()),
            profile_photo_url: photo_rows.first().map(|p| p.photo_url.clone()),
            registered_date: Some(student.registered_date),
            model_trained: Some(false),
            model_trained_at: None,
        };
        let stored: Vec<StudentRow> =
            self.client.upsert(&self.config.students_table, &[&row], "reg_number", Resolution::Merge)?;

        if !photo_rows.is_empty() {
            let _: Vec<serde_json::Value> = self.client.insert(&self.config.photos_table, &photo_rows)?;
        }

        tracing::info!(
            "Saved student {} ({}) with {} photos to remote store",
            student.name, student.reg_number, photo_rows.len()
        );
        let mut record = stored.into_iter().next().map(|row| self.to_record(row)).unwrap_or_else(|| student.clone());
        record.photo_dir = student.photo_dir.clone();
        if record.profile_photo_url.is_none() {
            record.profile_photo_url = row.profile_photo_url;
        }
        Ok(record)
    }

    fn mark_trained(&mut self, reg_numbers: &[String], at: DateTime<Local>) -> Result<()> {
        if reg_numbers.is_empty() {
            return Ok(());
        }
        self.client.update(
            &self.config.students_table,
            &[("reg_number", in_filter(reg_numbers))],
            &TrainedPatch { model_trained: true, model_trained_at: at },
        )
    }

    fn prepare_photos(&self, student: &StudentRecord) -> Result<usize> {
        if !photo_files(&student.photo_dir)?.is_empty() {
            return Ok(0);
        }

        let urls = self.photo_urls(student)?;
        if urls.is_empty() {
            tracing::warn!("No stored photos for {}", student.reg_number);
            return Ok(0);
        }

        fs::create_dir_all(&student.photo_dir)?;
        let mut fetched = 0;
        for (i, url) in urls.iter().enumerate() {
            match self.client.download(url) {
                Ok(bytes) => {
                    fs::write(student.photo_dir.join(format!("photo_{}.jpg", i + 1)), bytes)?;
                    fetched += 1;
                }
                Err(e) => tracing::warn!("Failed to download {}: {}", url, e),
            }
        }
        Ok(fetched)
    }

    fn attendance_on(&self, date: NaiveDate) -> Result<AttendanceDay> {
        let rows: Vec<AttendanceRow> = self.client.select(&self.config.attendance_table, &[
            ("select", "*".to_string()),
            ("attendance_date", eq(date)),
            ("order", "time.asc".to_string()),
        ])?;

        let mut day = AttendanceDay::new(date);
        for row in rows {
            day.entries.insert(row.reg_number.clone(), AttendanceEntry {
                name: row.name,
                reg_number: row.reg_number,
                time: row.time,
                status: row.status,
                marked_at: row.marked_at,
                class_id: row.class_id,
                classes_attended: row.classes_attended,
            });
        }
        Ok(day)
    }

    fn record_attendance(&mut self, date: NaiveDate, entry: &AttendanceEntry) -> Result<bool> {
        let row = AttendanceRow {
            attendance_date: date,
            reg_number: entry.reg_number.clone(),
            name: entry.name.clone(),
            time: entry.time.clone(),
            status: entry.status,
            marked_at: entry.marked_at,
            class_id: entry.class_id,
            classes_attended: entry.classes_attended.clone(),
        };
        let inserted: Vec<serde_json::Value> = self.client.upsert(
            &self.config.attendance_table,
            &[&row],
            "attendance_date,reg_number",
            Resolution::Ignore,
        )?;
        Ok(!inserted.is_empty())
    }

    fn credit_class(&mut self, date: NaiveDate, reg_number: &str, class_id: u64) -> Result<bool> {
        let filters = [("attendance_date", eq(date)), ("reg_number", eq(reg_number))];
        let mut query = vec![("select", "*".to_string())];
        query.extend(filters.iter().cloned());
        let rows: Vec<AttendanceRow> = self.client.select(&self.config.attendance_table, &query)?;

        let Some(row) = rows.into_iter().next() else {
            return Err(AttendanceError::StudentNotFound(reg_number.to_string()));
        };
        let mut entry = AttendanceEntry {
            name: row.name,
            reg_number: row.reg_number,
            time: row.time,
            status: row.status,
            marked_at: row.marked_at,
            class_id: row.class_id,
            classes_attended: row.classes_attended,
        };
        if !entry.credit(class_id) {
            return Ok(false);
        }

        let patch = ClassCreditPatch { class_id: entry.class_id, classes_attended: &entry.classes_attended };
        self.client.update(&self.config.attendance_table, &filters, &patch)?;
        Ok(true)
    }

    fn attendance_dates(&self) -> Result<Vec<NaiveDate>> {
        let rows: Vec<AttendanceDateRow> = self.client.select(&self.config.attendance_table, &[
            ("select", "attendance_date".to_string()),
            ("order", "attendance_date.desc,time.desc".to_string()),
            ("limit", ATTENDANCE_LIST_LIMIT.to_string()),
        ])?;
        let mut dates: Vec<NaiveDate> = rows.into_iter().map(|r| r.attendance_date).collect();
        dates.dedup();
        Ok(dates)
    }

    fn create_class(&mut self, class: &NewClass) -> Result<ClassRecord> {
        let row = NewClassRow {
            teacher_name: &class.teacher_name,
            teacher_unique_id: &class.teacher_unique_id,
            class_name: &class.class_name,
            duration_minutes: class.duration_minutes,
            class_time: &class.class_time,
            class_start_at: class.class_start_at,
            class_end_at: class.class_end_at,
            notification_status: NotificationStatus::Pending,
        };
        let created: Vec<ClassRecord> = self.client.insert(&self.config.classes_table, &[&row])?;
        created
            .into_iter()
            .next()
            .ok_or_else(|| AttendanceError::Remote("Class insert returned no row".into()))
    }

    fn classes(&self, ending_after: Option<DateTime<Local>>) -> Result<Vec<ClassRecord>> {
        let mut query = vec![
            ("select", "*".to_string()),
            ("order", "class_start_at.asc".to_string()),
            ("limit", CLASS_LIST_LIMIT.to_string()),
        ];
        if let Some(now) = ending_after {
            query.push(("class_end_at", format!("gte.{}", now.to_rfc3339_opts(SecondsFormat::Secs, false))));
        }
        self.client.select(&self.config.classes_table, &query)
    }

    fn class_by_id(&self, id: u64) -> Result<Option<ClassRecord>> {
        let rows: Vec<ClassRecord> = self.client.select(&self.config.classes_table, &[
            ("select", "*".to_string()),
            ("id", eq(id)),
            ("limit", "1".to_string()),
        ])?;
        Ok(rows.into_iter().next())
    }

    fn update_class(&mut self, id: u64, update: &ClassUpdate) -> Result<()> {
        self.client.update(&self.config.classes_table, &[("id", eq(id))], update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use httpmock::{Method::{GET, PATCH, POST}, MockServer};
    use serde_json::json;
    use std::time::Duration;

    fn store(server: &MockServer) -> (tempfile::TempDir, RemoteStore) {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = DataDirs::new(tmp.path(), false).unwrap();
        let client = SupabaseClient::new(&server.base_url(), "k", Duration::from_secs(5)).unwrap();
        (tmp, RemoteStore::new(client, RemoteConfig::default(), dirs))
    }

    fn student_json() -> serde_json::Value {
        json!({
            "student_id": 3,
            "name": "Ann Lee",
            "reg_number": "R1",
            "telegram_id": "100",
            "registered_date": "2024-05-01T09:00:00+00:00",
            "model_trained": false,
            "profile_photo_url": "http://cdn/profile.jpg",
            "created_at": "2024-05-01T09:00:00+00:00"
        })
    }

    #[test]
    fn students_map_to_local_photo_cache() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/rest/v1/students").query_param("order", "student_id.asc");
            then.status(200).json_body(json!([student_json()]));
        });

        let (_tmp, store) = store(&server);
        let students = store.students().unwrap();
        assert_eq!(students[0].id, 3);
        assert_eq!(students[0].telegram_id.as_deref(), Some("100"));
        assert!(students[0].photo_dir.ends_with("students/R1_Ann_Lee"));
    }

    #[test]
    fn stored_photo_folder_is_kept_for_the_cache() {
        let server = MockServer::start();
        let mut row = student_json();
        row["photo_dir"] = json!("/elsewhere/students/R1_Ann_Lee_2");
        server.mock(|when, then| {
            when.method(GET).path("/rest/v1/students");
            then.status(200).json_body(json!([row]));
        });

        let (tmp, store) = store(&server);
        let students = store.students().unwrap();
        assert_eq!(students[0].photo_dir, tmp.path().join("students/R1_Ann_Lee_2"));
    }

    #[test]
    fn next_id_follows_highest_student_id() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/rest/v1/students").query_param("order", "student_id.desc");
            then.status(200).json_body(json!([{ "student_id": 9 }]));
        });
        let (_tmp, store) = store(&server);
        assert_eq!(store.next_student_id().unwrap(), 10);
    }

    #[test]
    fn first_mark_of_the_day_wins() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/rest/v1/attendance")
                .query_param("on_conflict", "attendance_date,reg_number")
                .header("Prefer", "resolution=ignore-duplicates,return=representation")
                .json_body_partial(r#"[{"attendance_date": "2024-05-02", "reg_number": "R1", "status": "Present"}]"#);
            then.status(201).json_body(json!([]));
        });

        let (_tmp, mut store) = store(&server);
        let entry = AttendanceEntry {
            name: "Ann".into(),
            reg_number: "R1".into(),
            time: "09:00:00".into(),
            status: AttendanceStatus::Present,
            marked_at: None,
            class_id: None,
            classes_attended: Vec::new(),
        };
        let date = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        assert!(!store.record_attendance(date, &entry).unwrap());
        mock.assert();
    }

    #[test]
    fn class_credit_patches_the_days_row() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET)
                .path("/rest/v1/attendance")
                .query_param("attendance_date", "eq.2024-05-02")
                .query_param("reg_number", "eq.R1");
            then.status(200).json_body(json!([
                { "attendance_date": "2024-05-02", "reg_number": "R1", "name": "Ann", "time": "08:00:00", "status": "Present", "class_id": 4 }
            ]));
        });
        let patch = server.mock(|when, then| {
            when.method(PATCH)
                .path("/rest/v1/attendance")
                .query_param("attendance_date", "eq.2024-05-02")
                .query_param("reg_number", "eq.R1")
                .json_body(json!({ "class_id": 4, "classes_attended": [7] }));
            then.status(204);
        });

        let (_tmp, mut store) = store(&server);
        let date = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        assert!(store.credit_class(date, "R1", 7).unwrap());
        assert!(!store.credit_class(date, "R1", 4).unwrap());
        patch.assert_hits(1);
    }

    #[test]
    fn attendance_rows_become_a_day() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/rest/v1/attendance").query_param("attendance_date", "eq.2024-05-02");
            then.status(200).json_body(json!([
                { "attendance_date": "2024-05-02", "reg_number": "R1", "name": "Ann", "time": "09:00:00", "status": "Present", "class_id": 4 }
            ]));
        });

        let (_tmp, store) = store(&server);
        let day = store.attendance_on(NaiveDate::from_ymd_opt(2024, 5, 2).unwrap()).unwrap();
        assert!(day.is_marked("R1"));
        assert_eq!(day.entries["R1"].class_id, Some(4));
    }

    #[test]
    fn save_student_uploads_photos_then_rows() {
        let server = MockServer::start();
        let upload = server.mock(|when, then| {
            when.method(POST).path_contains("/storage/v1/object/student-photos/R1_Ann_Lee/photo_");
            then.status(200).json_body(json!({}));
        });
        let student_upsert = server.mock(|when, then| {
            when.method(POST)
                .path("/rest/v1/students")
                .query_param("on_conflict", "reg_number")
                .json_body_partial(r#"[{"reg_number": "R1", "model_trained": false}]"#);
            then.status(201).json_body(json!([student_json()]));
        });
        let photo_rows = server.mock(|when, then| {
            when.method(POST).path("/rest/v1/student_photos");
            then.status(201).json_body(json!([]));
        });

        let (tmp, mut store) = store(&server);
        let photo_dir = tmp.path().join("students/R1_Ann_Lee");
        fs::create_dir_all(&photo_dir).unwrap();
        let photos: Vec<PathBuf> = (1..=2)
            .map(|i| {
                let path = photo_dir.join(format!("photo_{}.jpg", i));
                fs::write(&path, b"jpeg").unwrap();
                path
            })
            .collect();

        let student = StudentRecord {
            id: 3,
            name: "Ann Lee".into(),
            reg_number: "R1".into(),
            photo_dir: photo_dir.clone(),
            registered_date: Local.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
            telegram_id: Some("100".into()),
            model_trained: false,
            model_trained_at: None,
            profile_photo_url: None,
        };
        let stored = store.save_student(&student, &photos).unwrap();

        upload.assert_hits(2);
        student_upsert.assert();
        photo_rows.assert();
        assert_eq!(stored.reg_number, "R1");
        assert_eq!(stored.photo_dir, photo_dir);
    }

    #[test]
    fn prepare_photos_downloads_when_cache_is_empty() {
        let server = MockServer::start();
        let photos_url = format!("{}/public/p1.jpg", server.base_url());
        server.mock(|when, then| {
            when.method(GET).path("/rest/v1/student_photos").query_param("reg_number", "eq.R1");
            then.status(200).json_body(json!([{ "photo_url": photos_url, "photo_no": 1 }, { "photo_url": "", "photo_no": 2 }]));
        });
        let download = server.mock(|when, then| {
            when.method(GET).path("/public/p1.jpg");
            then.status(200).body("jpeg-bytes");
        });

        let (tmp, store) = store(&server);
        let student = StudentRecord {
            id: 1,
            name: "Ann".into(),
            reg_number: "R1".into(),
            photo_dir: tmp.path().join("students/R1_Ann"),
            registered_date: Local.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
            telegram_id: None,
            model_trained: true,
            model_trained_at: None,
            profile_photo_url: None,
        };

        assert_eq!(store.prepare_photos(&student).unwrap(), 1);
        download.assert();
        assert_eq!(fs::read(student.photo_dir.join("photo_1.jpg")).unwrap(), b"jpeg-bytes");
        assert_eq!(store.prepare_photos(&student).unwrap(), 0);
    }

    #[test]
    fn mark_trained_patches_listed_students() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(PATCH)
                .path("/rest/v1/students")
                .query_param("reg_number", r#"in.("R1","R2")"#)
                .json_body_partial(r#"{"model_trained": true}"#);
            then.status(204);
        });

        let (_tmp, mut store) = store(&server);
        store.mark_trained(&["R1".into(), "R2".into()], Local::now()).unwrap();
        mock.assert();
    }

    #[test]
    fn classes_round_trip_through_rows() {
        let server = MockServer::start();
        let class_row = json!({
            "id": 5,
            "teacher_name": "T",
            "teacher_unique_id": "T-1",
            "class_name": "Math",
            "duration_minutes": 60,
            "class_time": "10:00",
            "class_start_at": "2024-05-02T10:00:00+00:00",
            "class_end_at": "2024-05-02T11:00:00+00:00",
            "notification_status": "pending"
        });
        let insert = server.mock(|when, then| {
            when.method(POST)
                .path("/rest/v1/classes")
                .json_body_partial(r#"[{"class_name": "Math", "notification_status": "pending"}]"#);
            then.status(201).json_body(json!([class_row.clone()]));
        });
        let update = server.mock(|when, then| {
            when.method(PATCH)
                .path("/rest/v1/classes")
                .query_param("id", "eq.5")
                .json_body(json!({ "notification_status": "skipped_no_token" }));
            then.status(204);
        });

        let (_tmp, mut store) = store(&server);
        let start = Local.with_ymd_and_hms(2024, 5, 2, 10, 0, 0).unwrap();
        let created = store
            .create_class(&NewClass {
                teacher_name: "T".into(),
                teacher_unique_id: "T-1".into(),
                class_name: "Math".into(),
                duration_minutes: 60,
                class_time: "10:00".into(),
                class_start_at: start,
                class_end_at: start + chrono::Duration::minutes(60),
            })
            .unwrap();
        insert.assert();
        assert_eq!(created.id, 5);
        assert_eq!(created.notification_status, NotificationStatus::Pending);

        store
            .update_class(5, &ClassUpdate {
                notification_status: Some(NotificationStatus::SkippedNoToken),
                ..ClassUpdate::default()
            })
            .unwrap();
        update.assert();
    }
}

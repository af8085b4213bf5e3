use crate::common::{AttendanceError, Result};
use crate::common::config::RemoteConfig;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// How an upsert treats a row that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Merge,
    Ignore,
}

impl Resolution {
    fn prefer(self) -> &'static str {
        match self {
            Resolution::Merge => "resolution=merge-duplicates,return=representation",
            Resolution::Ignore => "resolution=ignore-duplicates,return=representation",
        }
    }
}

/// Blocking client for the PostgREST tables and the object storage bucket.
pub struct SupabaseClient {
    http: Client,
    base_url: String,
    key: String,
}

impl SupabaseClient {
    pub fn new(base_url: &str, key: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            key: key.to_string(),
        })
    }

    pub fn from_config(config: &RemoteConfig) -> Result<Self> {
        let url = config.url.as_deref().filter(|v| !v.trim().is_empty());
        let key = config.key.as_deref().filter(|v| !v.trim().is_empty());
        match (url, key) {
            (Some(url), Some(key)) => Self::new(url, key, Duration::from_secs(config.timeout_seconds)),
            _ => Err(AttendanceError::Config(
                "Missing SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY (or SUPABASE_KEY)".into(),
            )),
        }
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    pub fn select<T: DeserializeOwned>(&self, table: &str, query: &[(&str, String)]) -> Result<Vec<T>> {
        let response = self.request(Method::GET, self.table_url(table)).query(query).send()?;
        Ok(check(response, table)?.json()?)
    }

    pub fn insert<B, T>(&self, table: &str, rows: &B) -> Result<Vec<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::POST, self.table_url(table))
            .header("Prefer", "return=representation")
            .json(rows)
            .send()?;
        Ok(check(response, table)?.json()?)
    }

    /// Inserts or resolves on the `on_conflict` columns. With
    /// `Resolution::Ignore` the result is empty when the row already existed.
    pub fn upsert<B, T>(&self, table: &str, rows: &B, on_conflict: &str, resolution: Resolution) -> Result<Vec<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::POST, self.table_url(table))
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", resolution.prefer())
            .json(rows)
            .send()?;
        Ok(check(response, table)?.json()?)
    }

    pub fn update<B: Serialize + ?Sized>(&self, table: &str, filters: &[(&str, String)], patch: &B) -> Result<()> {
        let response = self
            .request(Method::PATCH, self.table_url(table))
            .query(filters)
            .json(patch)
            .send()?;
        check(response, table)?;
        Ok(())
    }

    pub fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, bucket, path);
        let response = self
            .request(Method::POST, url)
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()?;
        check(response, path)?;
        Ok(())
    }

    pub fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.base_url, bucket, path)
    }

    /// Fetches a public object by its full URL.
    pub fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.http.get(url).send()?;
        Ok(check(response, url)?.bytes()?.to_vec())
    }
}

/// PostgREST `in.(...)` filter with each value quoted.
pub fn in_filter(values: &[String]) -> String {
    let quoted: Vec<String> = values
        .iter()
        .map(|v| format!("\"{}\"", v.replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}

fn check(response: Response, context: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(AttendanceError::Remote(format!("{} failed with {}: {}", context, status, body)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::{GET, PATCH, POST}, MockServer};
    use serde_json::{json, Value};

    fn client(server: &MockServer) -> SupabaseClient {
        SupabaseClient::new(&server.base_url(), "secret", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn select_sends_key_headers_and_filters() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/rest/v1/students")
                .header("apikey", "secret")
                .header("authorization", "Bearer secret")
                .query_param("reg_number", "eq.R1");
            then.status(200).json_body(json!([{ "reg_number": "R1" }]));
        });

        let rows: Vec<Value> = client(&server)
            .select("students", &[("reg_number", "eq.R1".to_string())])
            .unwrap();
        mock.assert();
        assert_eq!(rows[0]["reg_number"], "R1");
    }

    #[test]
    fn upsert_sets_conflict_target_and_preference() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/rest/v1/attendance")
                .query_param("on_conflict", "attendance_date,reg_number")
                .header("Prefer", "resolution=ignore-duplicates,return=representation");
            then.status(201).json_body(json!([]));
        });

        let rows: Vec<Value> = client(&server)
            .upsert("attendance", &json!({ "reg_number": "R1" }), "attendance_date,reg_number", Resolution::Ignore)
            .unwrap();
        mock.assert();
        assert!(rows.is_empty());
    }

    #[test]
    fn upload_posts_bytes_with_upsert_flag() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/storage/v1/object/student-photos/R1_Ann/photo_1.jpg")
                .header("x-upsert", "true")
                .header("content-type", "image/jpeg")
                .body("jpeg");
            then.status(200).json_body(json!({ "Key": "student-photos/R1_Ann/photo_1.jpg" }));
        });

        let client = client(&server);
        client.upload("student-photos", "R1_Ann/photo_1.jpg", b"jpeg".to_vec(), "image/jpeg").unwrap();
        mock.assert();
        assert_eq!(
            client.public_url("student-photos", "R1_Ann/photo_1.jpg"),
            format!("{}/storage/v1/object/public/student-photos/R1_Ann/photo_1.jpg", server.base_url())
        );
    }

    #[test]
    fn error_status_becomes_remote_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(PATCH).path("/rest/v1/classes");
            then.status(400).body("bad column");
        });

        let err = client(&server)
            .update("classes", &[("id", "eq.1".to_string())], &json!({ "x": 1 }))
            .unwrap_err();
        assert!(matches!(err, AttendanceError::Remote(msg) if msg.contains("bad column")));
    }

    #[test]
    fn missing_credentials_are_a_config_error() {
        let config = RemoteConfig { url: Some("http://x".into()), ..RemoteConfig::default() };
        assert!(matches!(
            SupabaseClient::from_config(&config),
            Err(AttendanceError::Config(msg)) if msg.contains("SUPABASE_URL")
        ));
    }

    #[test]
    fn in_filter_quotes_values() {
        assert_eq!(in_filter(&["R1".into(), "A,B".into()]), r#"in.("R1","A,B")"#);
    }
}

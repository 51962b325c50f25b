use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::BackendConfig;
use crate::error::BackendError;

/// Resource families owned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Task,
    Note,
    Reminder,
    Weather,
}

impl ResourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::Task => "Task",
            ResourceKind::Note => "Note",
            ResourceKind::Reminder => "Reminder",
            ResourceKind::Weather => "Weather",
        }
    }

    /// Collection path segment.
    pub fn collection(&self) -> &'static str {
        match self {
            ResourceKind::Task => "tasks",
            ResourceKind::Note => "notes",
            ResourceKind::Reminder => "reminders",
            ResourceKind::Weather => "weather",
        }
    }

    /// Path of the bulk-delete endpoint.
    pub fn clear_path(&self) -> Vec<String> {
        match self {
            ResourceKind::Weather => segments(&["weather", "history", "reset"]),
            other => segments(&[other.collection(), "clear_all"]),
        }
    }
}

/// Read-only collections the assistant can list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listing {
    Tasks,
    Notes,
    Reminders,
    TodayReminders,
    WeatherHistory,
}

impl Listing {
    pub fn path(&self) -> Vec<String> {
        match self {
            Listing::Tasks => segments(&["tasks"]),
            Listing::Notes => segments(&["notes"]),
            Listing::Reminders => segments(&["reminders"]),
            Listing::TodayReminders => segments(&["reminders", "today"]),
            Listing::WeatherHistory => segments(&["weather", "history"]),
        }
    }

    /// Key holding the rows in a non-empty response.
    pub fn key(&self) -> &'static str {
        match self {
            Listing::Tasks => "tasks",
            Listing::Notes => "notes",
            Listing::Reminders => "reminders",
            Listing::TodayReminders => "today_reminders",
            Listing::WeatherHistory => "history",
        }
    }

    pub fn noun(&self) -> &'static str {
        match self {
            Listing::Tasks => "tasks",
            Listing::Notes => "notes",
            Listing::Reminders => "reminders",
            Listing::TodayReminders => "reminders for today",
            Listing::WeatherHistory => "weather lookups",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    DueDate,
    Priority,
}

impl SortKey {
    pub fn query_value(&self) -> &'static str {
        match self {
            SortKey::DueDate => "due_date",
            SortKey::Priority => "priority",
        }
    }
}

fn segments(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        };
        write!(f, "{}", name)
    }
}

/// One HTTP call against the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendRequest {
    pub method: Method,
    pub segments: Vec<String>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl BackendRequest {
    pub fn new(method: Method, segments: Vec<String>) -> Self {
        Self { method, segments, query: Vec::new(), body: None }
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_body<T: Serialize>(mut self, body: &T) -> Result<Self, BackendError> {
        let value = serde_json::to_value(body).map_err(|e| BackendError::Decode(e.to_string()))?;
        self.body = Some(value);
        Ok(self)
    }

    /// Display form, e.g. `/tasks/5`.
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }
}

/// Transport to the Smart Life Manager API.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn send(&self, request: BackendRequest) -> Result<Value, BackendError>;
}

/// `reqwest` implementation with a per-request deadline.
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> anyhow::Result<Self> {
        let timeout = config.timeout();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| anyhow::anyhow!("Invalid backend base_url {}: {}", config.base_url, e))?;
        Ok(Self { client, base_url, timeout })
    }

    fn url_for(&self, request: &BackendRequest) -> Result<Url, BackendError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| BackendError::Transport(format!("base URL cannot hold a path: {}", self.base_url)))?;
            path.pop_if_empty();
            for segment in &request.segments {
                path.push(segment);
            }
        }
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }
        Ok(url)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn send(&self, request: BackendRequest) -> Result<Value, BackendError> {
        let url = self.url_for(&request)?;
        debug!("{} {}", request.method, url);

        let builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
            Method::Put => self.client.put(url),
            Method::Delete => self.client.delete(url),
        };
        let builder = match &request.body {
            Some(body) => builder.json(body),
            None => builder,
        };

        let response = builder
            .send()
            .await
            .map_err(|e| BackendError::from_reqwest(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status { status: status.as_u16(), body });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| BackendError::from_reqwest(e, self.timeout))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub due_date: String,
    pub priority: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewNote {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewReminder {
    pub content: String,
    pub date: String,
}

/// Fields to override on a task; blanks are left out of the body.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NoteChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReminderChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskRow {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub due_date: String,
    pub priority: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NoteRow {
    pub id: i64,
    pub content: String,
}

/// `[id, content, date]`; today's listing omits the date.
#[derive(Debug, Clone, PartialEq)]
pub struct ReminderRow {
    pub id: i64,
    pub content: String,
    pub date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WeatherEntry {
    pub id: i64,
    pub city: String,
    pub date: String,
    pub weather: String,
}

fn cell_i64(row: &[Value], idx: usize) -> Option<i64> {
    row.get(idx)?.as_i64()
}

fn cell_str(row: &[Value], idx: usize) -> String {
    match row.get(idx) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

impl TaskRow {
    pub fn from_row(row: &[Value]) -> Option<Self> {
        Some(Self {
            id: cell_i64(row, 0)?,
            title: cell_str(row, 1),
            description: cell_str(row, 2),
            due_date: cell_str(row, 3),
            priority: cell_i64(row, 4).unwrap_or(1),
        })
    }
}

impl NoteRow {
    pub fn from_row(row: &[Value]) -> Option<Self> {
        Some(Self { id: cell_i64(row, 0)?, content: cell_str(row, 1) })
    }
}

impl ReminderRow {
    pub fn from_row(row: &[Value]) -> Option<Self> {
        Some(Self {
            id: cell_i64(row, 0)?,
            content: cell_str(row, 1),
            date: row.get(2).map(|_| cell_str(row, 2)),
        })
    }
}

/// Rows under `key`, or nothing when the backend answered with only a message.
pub fn rows(body: &Value, key: &str) -> Result<Vec<Value>, BackendError> {
    match body.get(key) {
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(other) => Err(BackendError::Decode(format!("`{}` is not a list: {}", key, other))),
        None if body.get("message").is_some() => Ok(Vec::new()),
        None => Err(BackendError::Decode(format!("missing `{}` in {}", key, body))),
    }
}

/// Positional rows (`[[id, ...], ...]`) decoded with `parse`; malformed rows are skipped.
pub fn positional<T>(body: &Value, key: &str, parse: fn(&[Value]) -> Option<T>) -> Result<Vec<T>, BackendError> {
    Ok(rows(body, key)?
        .iter()
        .filter_map(|row| row.as_array().and_then(|cells| parse(cells)))
        .collect())
}

pub fn weather_history(body: &Value) -> Result<Vec<WeatherEntry>, BackendError> {
    rows(body, Listing::WeatherHistory.key())?
        .into_iter()
        .map(|v| serde_json::from_value(v).map_err(|e| BackendError::Decode(e.to_string())))
        .collect()
}

#[cfg(test)]
pub mod testing {
    use std::collections::HashMap;
    use std::sync::Arc;

    use serde_json::json;
    use tokio::sync::{Mutex, Notify};

    use super::*;

    /// Records every request and answers from canned responses keyed by
    /// `"<METHOD> <path>"`; unknown keys answer `{"message": "ok"}`.
    #[derive(Default)]
    pub struct FakeBackend {
        pub calls: Mutex<Vec<BackendRequest>>,
        responses: HashMap<String, Value>,
        failing: Vec<String>,
        gate: Option<Arc<Notify>>,
    }

    impl FakeBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(mut self, key: &str, body: Value) -> Self {
            self.responses.insert(key.to_string(), body);
            self
        }

        pub fn fail(mut self, key: &str) -> Self {
            self.failing.push(key.to_string());
            self
        }

        /// Hold every request until the gate is notified.
        pub fn gated(mut self, gate: Arc<Notify>) -> Self {
            self.gate = Some(gate);
            self
        }

        pub async fn calls(&self) -> Vec<BackendRequest> {
            self.calls.lock().await.clone()
        }

        pub async fn call_keys(&self) -> Vec<String> {
            self.calls
                .lock()
                .await
                .iter()
                .map(|r| format!("{} {}", r.method, r.path()))
                .collect()
        }
    }

    #[async_trait]
    impl Backend for FakeBackend {
        async fn send(&self, request: BackendRequest) -> Result<Value, BackendError> {
            let key = format!("{} {}", request.method, request.path());
            self.calls.lock().await.push(request);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.failing.contains(&key) {
                return Err(BackendError::Status { status: 500, body: "boom".to_string() });
            }
            Ok(self.responses.get(&key).cloned().unwrap_or_else(|| json!({"message": "ok"})))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_only_body_is_empty_collection() {
        let body = json!({"message": "No tasks found."});
        assert!(rows(&body, "tasks").unwrap().is_empty());
        let tasks = positional(&body, "tasks", TaskRow::from_row).unwrap();
        assert!(tasks.is_empty());
    }

    #[test]
    fn test_unexpected_body_is_decode_error() {
        let err = rows(&json!({"detail": "nope"}), "tasks").unwrap_err();
        assert!(matches!(err, BackendError::Decode(_)));
    }

    #[test]
    fn test_positional_task_rows() {
        let body = json!({"tasks": [[1, "Buy milk", "", "2025-12-01", 3], [2, "Gym", null, "2025-06-01 19:00:00", 1], "junk"]});
        let tasks = positional(&body, "tasks", TaskRow::from_row).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].title, "Buy milk");
        assert_eq!(tasks[0].priority, 3);
        assert_eq!(tasks[1].description, "");
    }

    #[test]
    fn test_today_reminders_have_no_date() {
        let body = json!({"today_reminders": [[4, "Call mom"]]});
        let rows = positional(&body, "today_reminders", ReminderRow::from_row).unwrap();
        assert_eq!(rows[0], ReminderRow { id: 4, content: "Call mom".to_string(), date: None });
    }

    #[test]
    fn test_weather_history_objects() {
        let body = json!({"history": [{"id": 1, "city": "Pune", "date": "2025-06-01", "weather": "Pune: 31°C"}]});
        let history = weather_history(&body).unwrap();
        assert_eq!(history[0].city, "Pune");
        let empty = weather_history(&json!({"message": "Weather history is not available."})).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_change_sets_skip_blank_fields() {
        let changes = TaskChanges { title: Some("New".to_string()), priority: Some(2), ..Default::default() };
        assert_eq!(serde_json::to_value(&changes).unwrap(), json!({"title": "New", "priority": 2}));
    }

    #[test]
    fn test_url_segments_are_encoded() {
        let backend = HttpBackend::new(&BackendConfig {
            base_url: "http://127.0.0.1:8000".to_string(),
            timeout_secs: 1,
        })
        .unwrap();
        let request = BackendRequest::new(Method::Get, vec!["weather".to_string(), "New York/../x".to_string()]);
        let url = backend.url_for(&request).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8000/weather/New%20York%2F..%2Fx");

        let sorted = BackendRequest::new(Method::Get, Listing::Tasks.path()).with_query("sort_by", "priority");
        assert_eq!(backend.url_for(&sorted).unwrap().as_str(), "http://127.0.0.1:8000/tasks?sort_by=priority");
    }

    #[test]
    fn test_clear_paths() {
        assert_eq!(ResourceKind::Task.clear_path().join("/"), "tasks/clear_all");
        assert_eq!(ResourceKind::Weather.clear_path().join("/"), "weather/history/reset");
    }
}

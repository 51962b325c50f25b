use std::sync::Arc;

use anyhow::Result;
use log::{error, info};
use serde_json::Value;

use crate::backend::{
    self, Backend, BackendRequest, Listing, Method, NewNote, NewReminder, NewTask, NoteChanges,
    NoteRow, ReminderChanges, ReminderRow, ResourceKind, SortKey, TaskChanges, TaskRow,
};
use crate::error::BackendError;
use crate::event_bus::{Event, EventBus, EventEmitter};
use crate::impl_event_emitter;

/// Replies list at most this many records.
const MAX_LISTED: usize = 20;

/// A fully specified backend operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    CreateTask(NewTask),
    CreateNote(NewNote),
    CreateReminder(NewReminder),
    UpdateTask { id: String, changes: TaskChanges },
    UpdateNote { id: String, changes: NoteChanges },
    UpdateReminder { id: String, changes: ReminderChanges },
    Delete { kind: ResourceKind, id: String },
    DeleteAll(ResourceKind),
    List(Listing),
    SortTasks(SortKey),
    Weather { city: String },
}

/// What the user is told after one action.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub success: bool,
    pub message: String,
}

impl Outcome {
    fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into() }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into() }
    }
}

/// Turns actions into backend calls and their results into reply text.
pub struct Dispatcher {
    backend: Arc<dyn Backend>,
    event_bus: Option<Arc<EventBus>>,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend, event_bus: None }
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Run one action. Failures become a failure message; nothing is retried.
    pub async fn dispatch(&self, action: &Action) -> Outcome {
        let request = match request_for(action) {
            Ok(request) => request,
            Err(e) => {
                error!("Could not build request for {:?}: {}", action, e);
                return Outcome::failed(failure_message(action));
            }
        };
        let path = request.path();

        let _ = self
            .emit_event(Event::BackendRequest {
                method: request.method.to_string(),
                path: path.clone(),
            })
            .await;

        let result = self
            .backend
            .send(request)
            .await
            .and_then(|body| success_message(action, &body));

        match result {
            Ok(message) => {
                info!("{} succeeded", path);
                Outcome::ok(message)
            }
            Err(e) => {
                error!("{} failed: {}", path, e);
                let _ = self
                    .emit_event(Event::BackendFailed { path, error: e.to_string() })
                    .await;
                Outcome::failed(failure_message(action))
            }
        }
    }
}

impl_event_emitter!(Dispatcher);

fn id_path(kind: ResourceKind, id: &str) -> Vec<String> {
    vec![kind.collection().to_string(), id.trim().to_string()]
}

/// The single HTTP call backing `action`.
pub fn request_for(action: &Action) -> Result<BackendRequest, BackendError> {
    let collection = |kind: ResourceKind| vec![kind.collection().to_string()];
    match action {
        Action::CreateTask(task) => {
            BackendRequest::new(Method::Post, collection(ResourceKind::Task)).with_body(task)
        }
        Action::CreateNote(note) => {
            BackendRequest::new(Method::Post, collection(ResourceKind::Note)).with_body(note)
        }
        Action::CreateReminder(reminder) => {
            BackendRequest::new(Method::Post, collection(ResourceKind::Reminder)).with_body(reminder)
        }
        Action::UpdateTask { id, changes } => {
            BackendRequest::new(Method::Put, id_path(ResourceKind::Task, id)).with_body(changes)
        }
        Action::UpdateNote { id, changes } => {
            BackendRequest::new(Method::Put, id_path(ResourceKind::Note, id)).with_body(changes)
        }
        Action::UpdateReminder { id, changes } => {
            BackendRequest::new(Method::Put, id_path(ResourceKind::Reminder, id)).with_body(changes)
        }
        Action::Delete { kind, id } => Ok(BackendRequest::new(Method::Delete, id_path(*kind, id))),
        Action::DeleteAll(kind) => Ok(BackendRequest::new(Method::Delete, kind.clear_path())),
        Action::List(listing) => Ok(BackendRequest::new(Method::Get, listing.path())),
        Action::SortTasks(key) => Ok(BackendRequest::new(Method::Get, Listing::Tasks.path())
            .with_query("sort_by", key.query_value())),
        Action::Weather { city } => Ok(BackendRequest::new(
            Method::Get,
            vec!["weather".to_string(), city.trim().to_string()],
        )),
    }
}

fn success_message(action: &Action, body: &Value) -> Result<String, BackendError> {
    let message = match action {
        Action::CreateTask(task) => format!("✅ Task \"{}\" added successfully!", task.title),
        Action::CreateNote(note) => format!("✅ Note \"{}\" added!", note.content),
        Action::CreateReminder(reminder) => {
            format!("✅ Reminder \"{}\" added for {}!", reminder.content, reminder.date)
        }
        Action::UpdateTask { id, .. } => format!("✅ Task {} updated successfully!", id.trim()),
        Action::UpdateNote { id, .. } => format!("✅ Note {} updated!", id.trim()),
        Action::UpdateReminder { id, .. } => format!("✅ Reminder {} updated!", id.trim()),
        Action::Delete { kind, id } => format!("✅ {} {} deleted!", kind.label(), id.trim()),
        Action::DeleteAll(ResourceKind::Weather) => "✅ Weather history reset.".to_string(),
        Action::DeleteAll(kind) => format!("✅ All {} cleared.", kind.collection()),
        Action::List(listing) => render_listing(*listing, body)?,
        Action::SortTasks(key) => render_sorted_tasks(*key, body)?,
        Action::Weather { city } => match body.get("weather").and_then(Value::as_str) {
            Some(report) => format!("🌤️ {}", report),
            None => return Err(BackendError::Decode(format!("no weather for {} in {}", city, body))),
        },
    };
    Ok(message)
}

fn failure_message(action: &Action) -> String {
    match action {
        Action::CreateTask(_) => "❌ Failed to add task.".to_string(),
        Action::CreateNote(_) => "❌ Failed to add note.".to_string(),
        Action::CreateReminder(_) => "❌ Failed to add reminder.".to_string(),
        Action::UpdateTask { .. } => "❌ Failed to update task.".to_string(),
        Action::UpdateNote { .. } => "❌ Failed to update note.".to_string(),
        Action::UpdateReminder { .. } => "❌ Failed to update reminder.".to_string(),
        Action::Delete { kind, .. } => format!("❌ Failed to delete {}.", kind.label().to_lowercase()),
        Action::DeleteAll(ResourceKind::Weather) => "❌ Failed to reset weather history.".to_string(),
        Action::DeleteAll(kind) => format!("❌ Failed to clear {}.", kind.collection()),
        Action::List(listing) => format!("❌ Failed to fetch {}.", listing.noun()),
        Action::SortTasks(_) => "❌ Failed to sort tasks.".to_string(),
        Action::Weather { city } => format!("❌ Weather for {} not available.", city.trim()),
    }
}

fn render_lines(heading: String, lines: Vec<String>) -> String {
    let total = lines.len();
    let mut out = heading;
    for line in lines.into_iter().take(MAX_LISTED) {
        out.push('\n');
        out.push_str(&line);
    }
    if total > MAX_LISTED {
        out.push_str(&format!("\n…and {} more", total - MAX_LISTED));
    }
    out
}

fn task_line(task: &TaskRow) -> String {
    let mut line = format!("#{} {} (due {}, priority {})", task.id, task.title, task.due_date, task.priority);
    if !task.description.is_empty() {
        line.push_str(&format!(" - {}", task.description));
    }
    line
}

fn render_listing(listing: Listing, body: &Value) -> Result<String, BackendError> {
    let lines: Vec<String> = match listing {
        Listing::Tasks => backend::positional(body, listing.key(), TaskRow::from_row)?
            .iter()
            .map(task_line)
            .collect(),
        Listing::Notes => backend::positional(body, listing.key(), NoteRow::from_row)?
            .iter()
            .map(|n| format!("#{} {}", n.id, n.content))
            .collect(),
        Listing::Reminders | Listing::TodayReminders => {
            backend::positional(body, listing.key(), ReminderRow::from_row)?
                .iter()
                .map(|r| match &r.date {
                    Some(date) => format!("#{} {} ({})", r.id, r.content, date),
                    None => format!("#{} {}", r.id, r.content),
                })
                .collect()
        }
        Listing::WeatherHistory => backend::weather_history(body)?
            .iter()
            .map(|w| format!("{} | {} | {}", w.city, w.date, w.weather))
            .collect(),
    };

    if lines.is_empty() {
        return Ok(format!("📋 No {} found.", listing.noun()));
    }
    Ok(render_lines(format!("📋 {} {} found:", lines.len(), listing.noun()), lines))
}

/// Orders tasks client-side: earliest due date first, or priority 1 first.
pub fn sort_tasks(tasks: &mut [TaskRow], key: SortKey) {
    match key {
        SortKey::DueDate => tasks.sort_by(|a, b| a.due_date.cmp(&b.due_date).then(a.id.cmp(&b.id))),
        SortKey::Priority => tasks.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.id.cmp(&b.id))),
    }
}

fn render_sorted_tasks(key: SortKey, body: &Value) -> Result<String, BackendError> {
    let mut tasks = backend::positional(body, Listing::Tasks.key(), TaskRow::from_row)?;
    if tasks.is_empty() {
        return Ok("📋 No tasks found.".to_string());
    }
    sort_tasks(&mut tasks, key);
    let heading = match key {
        SortKey::DueDate => "📅 Tasks sorted by date:",
        SortKey::Priority => "⚡ Tasks sorted by priority:",
    };
    Ok(render_lines(heading.to_string(), tasks.iter().map(task_line).collect()))
}

//! Multi-turn forms that collect one field per user turn.
//!
//! Each form starts at its first unfilled step, stores the answer for that
//! step, and either prompts for the next field or hands back a complete
//! [`Action`]. Only the clear-all form can answer without advancing.

use chrono::NaiveDate;

use crate::backend::{
    NewNote, NewReminder, NewTask, NoteChanges, ReminderChanges, ResourceKind, TaskChanges,
};
use crate::dispatcher::Action;
use crate::extract::{self, Extraction};

pub const UNTITLED_TASK: &str = "Untitled task";

/// Result of feeding one answer to a form.
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    /// Answer stored; ask for the next field.
    Next(String),
    /// Answer rejected; ask again without moving.
    Reprompt(String),
    /// Every field collected.
    Complete(Action),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddTaskForm {
    title: Option<String>,
    description: Option<String>,
    due_date: Option<String>,
    priority: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditTaskForm {
    step: usize,
    id: Option<String>,
    changes: TaskChanges,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddReminderForm {
    content: Option<String>,
    date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditNoteForm {
    id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditReminderForm {
    step: usize,
    id: Option<String>,
    changes: ReminderChanges,
}

/// The single open form, one variant per intent family.
#[derive(Debug, Clone, PartialEq)]
pub enum Wizard {
    AddTask(AddTaskForm),
    EditTask(EditTaskForm),
    AddNote,
    EditNote(EditNoteForm),
    AddReminder(AddReminderForm),
    EditReminder(EditReminderForm),
    Delete(ResourceKind),
    WeatherSearch,
    ClearAll,
}

/// Starting a form either opens it or, when the utterance already held
/// every field, produces the action straight away.
#[derive(Debug, Clone, PartialEq)]
pub enum Start {
    Open(Wizard, String),
    Ready(Action),
}

const TASK_STEPS: usize = 4;
const EDIT_TASK_STEPS: usize = 5;
const EDIT_REMINDER_STEPS: usize = 3;

fn missing_id(prompt: String) -> Advance {
    Advance::Reprompt(format!("⚠️ An ID is required.\n{}", prompt))
}

/// Answers that count as blank.
const SKIP_WORDS: &[&str] = &["skip", "-", "none"];

fn non_blank(input: &str) -> Option<String> {
    let trimmed = input.trim();
    let skipped = trimmed.is_empty() || SKIP_WORDS.iter().any(|w| trimmed.eq_ignore_ascii_case(w));
    (!skipped).then(|| trimmed.to_string())
}

impl AddTaskForm {
    fn step(&self) -> usize {
        if self.title.is_none() {
            0
        } else if self.description.is_none() {
            1
        } else if self.due_date.is_none() {
            2
        } else {
            3
        }
    }

    fn prompt(&self) -> String {
        match self.step() {
            0 => format!("Step 1/{}: Task title?", TASK_STEPS),
            1 => format!("Step 2/{}: Description? (or \"skip\")", TASK_STEPS),
            2 => format!("Step 3/{}: Due date? (YYYY-MM-DD or MM/DD/YYYY, \"skip\" for today)", TASK_STEPS),
            _ => format!("Step 4/{}: Priority (1-5)?", TASK_STEPS),
        }
    }

    fn is_complete(&self) -> bool {
        self.title.is_some() && self.description.is_some() && self.due_date.is_some() && self.priority.is_some()
    }

    fn into_action(self) -> Action {
        Action::CreateTask(NewTask {
            title: self.title.unwrap_or_else(|| UNTITLED_TASK.to_string()),
            description: self.description.unwrap_or_default(),
            due_date: self.due_date.unwrap_or_default(),
            priority: self.priority.unwrap_or(extract::DEFAULT_PRIORITY),
        })
    }
}

impl EditTaskForm {
    fn prompt(&self) -> String {
        match self.step {
            0 => format!("Step 1/{}: Task ID?", EDIT_TASK_STEPS),
            1 => format!("Step 2/{}: New title? (\"skip\" to keep)", EDIT_TASK_STEPS),
            2 => format!("Step 3/{}: New description? (\"skip\" to keep)", EDIT_TASK_STEPS),
            3 => format!("Step 4/{}: New due date? (\"skip\" to keep)", EDIT_TASK_STEPS),
            _ => format!("Step 5/{}: New priority 1-5? (\"skip\" to keep)", EDIT_TASK_STEPS),
        }
    }
}

impl EditReminderForm {
    fn prompt(&self) -> String {
        match self.step {
            0 => format!("Step 1/{}: Reminder ID?", EDIT_REMINDER_STEPS),
            1 => format!("Step 2/{}: New content? (\"skip\" to keep)", EDIT_REMINDER_STEPS),
            _ => format!("Step 3/{}: New date? (\"skip\" to keep)", EDIT_REMINDER_STEPS),
        }
    }
}

impl Wizard {
    /// Open the add form for `kind`, prefilled from the utterance.
    pub fn start_add(kind: ResourceKind, extraction: &Extraction, today: NaiveDate) -> Start {
        match kind {
            ResourceKind::Task => {
                let form = AddTaskForm {
                    title: extraction.title.clone(),
                    description: None,
                    due_date: extraction.has_schedule().then(|| extraction.due_date(today)),
                    priority: extraction.priority,
                };
                let prompt = match &form.title {
                    Some(title) => format!("✅ Title: \"{}\"\n{}", title, form.prompt()),
                    None => format!("📝 Add Task Form Started!\n{}", form.prompt()),
                };
                Start::Open(Wizard::AddTask(form), prompt)
            }
            ResourceKind::Note => match &extraction.title {
                Some(content) => Start::Ready(Action::CreateNote(NewNote { content: content.clone() })),
                None => Start::Open(Wizard::AddNote, "📝 Add Note Form Started!\nStep 1/1: Note content?".to_string()),
            },
            ResourceKind::Reminder => {
                let form = AddReminderForm {
                    content: extraction.title.clone(),
                    date: extraction.has_schedule().then(|| extraction.due_date(today)),
                };
                match (form.content.clone(), form.date.clone()) {
                    (Some(content), Some(date)) => {
                        Start::Ready(Action::CreateReminder(NewReminder { content, date }))
                    }
                    (Some(content), None) => Start::Open(
                        Wizard::AddReminder(form),
                        format!("✅ Reminder: \"{}\"\nStep 2/2: Date? (YYYY-MM-DD or MM/DD/YYYY, \"skip\" for today)", content),
                    ),
                    _ => Start::Open(
                        Wizard::AddReminder(form),
                        "⏰ Add Reminder Form Started!\nStep 1/2: Reminder content?".to_string(),
                    ),
                }
            }
            ResourceKind::Weather => Wizard::start_weather(extraction),
        }
    }

    /// Open the edit form for `kind`; an id in the utterance skips step one.
    pub fn start_edit(kind: ResourceKind, extraction: &Extraction) -> Start {
        let id = extraction.id.clone();
        let step = usize::from(id.is_some());
        let (wizard, header) = match kind {
            ResourceKind::Task => (
                Wizard::EditTask(EditTaskForm { step, id, changes: TaskChanges::default() }),
                "✏️ Edit Task Form Started!",
            ),
            ResourceKind::Note => (Wizard::EditNote(EditNoteForm { id }), "✏️ Edit Note Form Started!"),
            ResourceKind::Reminder => (
                Wizard::EditReminder(EditReminderForm { step, id, changes: ReminderChanges::default() }),
                "✏️ Edit Reminder Form Started!",
            ),
            ResourceKind::Weather => return Wizard::start_weather(extraction),
        };
        Start::Open(wizard.clone(), format!("{}\n{}", header, wizard.prompt()))
    }

    /// Delete is one step: an id in the utterance dispatches immediately.
    pub fn start_delete(kind: ResourceKind, extraction: &Extraction) -> Start {
        match (&extraction.id, kind) {
            (_, ResourceKind::Weather) => Start::Ready(Action::DeleteAll(ResourceKind::Weather)),
            (Some(id), _) => Start::Ready(Action::Delete { kind, id: id.clone() }),
            (None, _) => Start::Open(
                Wizard::Delete(kind),
                format!("🗑️ Delete {}\n{}", kind.label(), Wizard::Delete(kind).prompt()),
            ),
        }
    }

    pub fn start_weather(extraction: &Extraction) -> Start {
        match &extraction.city {
            Some(city) => Start::Ready(Action::Weather { city: city.clone() }),
            None => Start::Open(
                Wizard::WeatherSearch,
                format!("🌤️ Weather search\n{}", Wizard::WeatherSearch.prompt()),
            ),
        }
    }

    pub fn start_clear_all() -> Start {
        Start::Open(Wizard::ClearAll, format!("🧹 Clear All\n{}", Wizard::ClearAll.prompt()))
    }

    /// Prompt for the current step.
    pub fn prompt(&self) -> String {
        match self {
            Wizard::AddTask(form) => form.prompt(),
            Wizard::EditTask(form) => form.prompt(),
            Wizard::AddNote => "Step 1/1: Note content?".to_string(),
            Wizard::EditNote(form) if form.id.is_none() => "Step 1/2: Note ID?".to_string(),
            Wizard::EditNote(_) => "Step 2/2: New content?".to_string(),
            Wizard::AddReminder(form) if form.content.is_none() => "Step 1/2: Reminder content?".to_string(),
            Wizard::AddReminder(_) => "Step 2/2: Date? (YYYY-MM-DD or MM/DD/YYYY, \"skip\" for today)".to_string(),
            Wizard::EditReminder(form) => form.prompt(),
            Wizard::Delete(kind) => format!("Enter {} ID to delete:", kind.label()),
            Wizard::WeatherSearch => "Enter city name (\"skip\" for the default city):".to_string(),
            Wizard::ClearAll => "What to clear? (tasks/notes/reminders/weather)".to_string(),
        }
    }

    /// Feed one answer. `default_city` fills a blank weather answer.
    pub fn advance(&mut self, input: &str, today: NaiveDate, default_city: &str) -> Advance {
        let answer = non_blank(input);
        match self {
            Wizard::AddTask(form) => {
                match form.step() {
                    0 => form.title = Some(answer.unwrap_or_else(|| UNTITLED_TASK.to_string())),
                    1 => form.description = Some(answer.unwrap_or_default()),
                    2 => {
                        form.due_date = Some(
                            extract::parse_due_input(input, today)
                                .unwrap_or_else(|| today.format("%Y-%m-%d").to_string()),
                        )
                    }
                    _ => form.priority = Some(extract::parse_priority(input)),
                }
                if form.is_complete() {
                    Advance::Complete(form.clone().into_action())
                } else {
                    Advance::Next(form.prompt())
                }
            }
            Wizard::EditTask(form) => {
                match form.step {
                    0 if answer.is_none() => return missing_id(form.prompt()),
                    0 => form.id = answer,
                    1 => form.changes.title = answer,
                    2 => form.changes.description = answer,
                    3 => form.changes.due_date = extract::parse_due_input(input, today),
                    _ => form.changes.priority = answer.map(|a| extract::parse_priority(&a)),
                }
                form.step += 1;
                if form.step < EDIT_TASK_STEPS {
                    Advance::Next(form.prompt())
                } else {
                    Advance::Complete(Action::UpdateTask {
                        id: form.id.clone().unwrap_or_default(),
                        changes: form.changes.clone(),
                    })
                }
            }
            Wizard::AddNote => Advance::Complete(Action::CreateNote(NewNote {
                content: answer.unwrap_or_default(),
            })),
            Wizard::EditNote(form) => match form.id.clone() {
                None if answer.is_none() => missing_id(self.prompt()),
                None => {
                    form.id = answer;
                    Advance::Next(self.prompt())
                }
                Some(id) => Advance::Complete(Action::UpdateNote {
                    id,
                    changes: NoteChanges { content: answer },
                }),
            },
            Wizard::AddReminder(form) => match form.content.clone() {
                None => {
                    form.content = Some(answer.unwrap_or_default());
                    Advance::Next(self.prompt())
                }
                Some(content) => Advance::Complete(Action::CreateReminder(NewReminder {
                    content,
                    date: extract::parse_due_input(input, today)
                        .unwrap_or_else(|| today.format("%Y-%m-%d").to_string()),
                })),
            },
            Wizard::EditReminder(form) => {
                match form.step {
                    0 if answer.is_none() => return missing_id(form.prompt()),
                    0 => form.id = answer,
                    1 => form.changes.content = answer,
                    _ => form.changes.date = extract::parse_due_input(input, today),
                }
                form.step += 1;
                if form.step < EDIT_REMINDER_STEPS {
                    Advance::Next(form.prompt())
                } else {
                    Advance::Complete(Action::UpdateReminder {
                        id: form.id.clone().unwrap_or_default(),
                        changes: form.changes.clone(),
                    })
                }
            }
            Wizard::Delete(kind) => match answer {
                Some(id) => Advance::Complete(Action::Delete { kind: *kind, id }),
                None => missing_id(self.prompt()),
            },
            Wizard::WeatherSearch => Advance::Complete(Action::Weather {
                city: answer.unwrap_or_else(|| default_city.to_string()),
            }),
            Wizard::ClearAll => match extract::clear_target(input) {
                Some(kind) => Advance::Complete(Action::DeleteAll(kind)),
                None => Advance::Reprompt(
                    "⚠️ Unknown clear option. Please specify tasks, notes, reminders, or weather.".to_string(),
                ),
            },
        }
    }
}

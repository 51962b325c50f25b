//! Keyword classification of a normalized utterance.
//!
//! The rule table is evaluated top to bottom and the first rule with a
//! trigger contained in the input wins. Specific phrases ("delete task")
//! must therefore sit above the general ones ("task"); ties are settled by
//! position, never by match length.

use crate::backend::{Listing, ResourceKind, SortKey};
use crate::transcript::Section;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Greeting,
    Navigate(Section),
    /// Bulk delete of one resource family.
    Clear(ResourceKind),
    /// Asks which family to clear.
    ClearAll,
    SortTasks(SortKey),
    List(Listing),
    Add(ResourceKind),
    Edit(ResourceKind),
    Delete(ResourceKind),
    Weather,
    /// Bare "task ..." phrasing, read as a quick add.
    QuickTask,
    /// Mentions an operations keyword but no rule handles it.
    Unrecognized,
}

impl Intent {
    /// Direct commands replace an open form instead of feeding it.
    pub fn is_direct_command(&self) -> bool {
        matches!(
            self,
            Intent::Navigate(_)
                | Intent::Clear(_)
                | Intent::ClearAll
                | Intent::SortTasks(_)
                | Intent::List(_)
                | Intent::Add(_)
                | Intent::Edit(_)
                | Intent::Delete(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Matcher {
    /// Trigger appears anywhere in the input.
    Contains,
    /// Trigger appears bounded by non-alphanumeric characters.
    Word,
    /// Trigger starts a word and is followed by whitespace and more text.
    Titled,
}

#[derive(Debug)]
struct Rule {
    triggers: &'static [&'static str],
    matcher: Matcher,
    intent: Intent,
}

const fn contains(triggers: &'static [&'static str], intent: Intent) -> Rule {
    Rule { triggers, matcher: Matcher::Contains, intent }
}

const fn word(triggers: &'static [&'static str], intent: Intent) -> Rule {
    Rule { triggers, matcher: Matcher::Word, intent }
}

const fn titled(triggers: &'static [&'static str], intent: Intent) -> Rule {
    Rule { triggers, matcher: Matcher::Titled, intent }
}

static RULES: &[Rule] = &[
    word(
        &[
            "hey sara", "hi sara", "hello sara", "how are you", "good morning",
            "good afternoon", "good evening", "hey", "hi", "hello",
        ],
        Intent::Greeting,
    ),
    contains(&["go to tasks", "open tasks"], Intent::Navigate(Section::Tasks)),
    contains(&["go to notes", "open notes"], Intent::Navigate(Section::Notes)),
    contains(&["go to reminders", "open reminders"], Intent::Navigate(Section::Reminders)),
    contains(&["go to weather", "open weather"], Intent::Navigate(Section::Weather)),
    contains(&["go to clear", "open clear"], Intent::Navigate(Section::Clear)),
    contains(
        &["clear weather history", "reset weather history"],
        Intent::Clear(ResourceKind::Weather),
    ),
    contains(&["clear all tasks", "clear tasks"], Intent::Clear(ResourceKind::Task)),
    contains(&["clear all notes", "clear notes"], Intent::Clear(ResourceKind::Note)),
    contains(
        &["clear all reminders", "clear reminders"],
        Intent::Clear(ResourceKind::Reminder),
    ),
    contains(&["clear all", "clear everything"], Intent::ClearAll),
    contains(&["sort tasks by date", "sort by date"], Intent::SortTasks(SortKey::DueDate)),
    contains(
        &["sort tasks by priority", "sort by priority"],
        Intent::SortTasks(SortKey::Priority),
    ),
    contains(
        &["today's reminders", "todays reminders", "reminders today", "reminders for today"],
        Intent::List(Listing::TodayReminders),
    ),
    contains(
        &["show tasks", "list tasks", "show task", "list task"],
        Intent::List(Listing::Tasks),
    ),
    contains(&["show notes", "list notes"], Intent::List(Listing::Notes)),
    contains(&["show reminders", "list reminders"], Intent::List(Listing::Reminders)),
    contains(&["weather history"], Intent::List(Listing::WeatherHistory)),
    contains(&["edit task", "update task"], Intent::Edit(ResourceKind::Task)),
    contains(&["delete task", "remove task"], Intent::Delete(ResourceKind::Task)),
    contains(&["add task", "new task", "create task"], Intent::Add(ResourceKind::Task)),
    contains(&["edit note", "update note"], Intent::Edit(ResourceKind::Note)),
    contains(&["delete note", "remove note"], Intent::Delete(ResourceKind::Note)),
    contains(&["add note", "new note", "create note"], Intent::Add(ResourceKind::Note)),
    contains(&["edit reminder", "update reminder"], Intent::Edit(ResourceKind::Reminder)),
    contains(&["delete reminder", "remove reminder"], Intent::Delete(ResourceKind::Reminder)),
    contains(
        &["add reminder", "new reminder", "create reminder"],
        Intent::Add(ResourceKind::Reminder),
    ),
    contains(&["weather"], Intent::Weather),
    titled(&["task"], Intent::QuickTask),
    contains(
        &["task", "note", "reminder", "sort", "go to", "open", "clear", "reset"],
        Intent::Unrecognized,
    ),
];

/// Lower-case and trim raw input the way [`classify`] expects it.
pub fn normalize(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Whole-input phrases that abandon an open form.
pub fn is_cancel(normalized: &str) -> bool {
    const CANCEL: &[&str] = &["cancel", "stop", "never mind", "nevermind", "exit form"];
    let text = normalized.trim_end_matches(['.', '!']);
    CANCEL.contains(&text)
}

/// Classify normalized text. `None` means free-form conversation.
pub fn classify(normalized: &str) -> Option<Intent> {
    RULES
        .iter()
        .find(|rule| rule.triggers.iter().any(|t| rule_matches(rule.matcher, normalized, t)))
        .map(|rule| rule.intent)
}

/// The trigger that fired for `intent`, used to locate the text after it.
pub fn matched_trigger(normalized: &str, intent: Intent) -> Option<&'static str> {
    RULES
        .iter()
        .filter(|rule| rule.intent == intent)
        .flat_map(|rule| rule.triggers.iter().map(move |t| (rule.matcher, *t)))
        .find(|(matcher, t)| rule_matches(*matcher, normalized, t))
        .map(|(_, t)| t)
}

fn rule_matches(matcher: Matcher, text: &str, trigger: &str) -> bool {
    match matcher {
        Matcher::Contains => text.contains(trigger),
        Matcher::Word => contains_word(text, trigger),
        Matcher::Titled => starts_titled_phrase(text, trigger),
    }
}

fn starts_titled_phrase(text: &str, trigger: &str) -> bool {
    text.match_indices(trigger).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let rest = &text[start + trigger.len()..];
        !before.is_some_and(char::is_alphanumeric)
            && rest.starts_with(char::is_whitespace)
            && !rest.trim().is_empty()
    })
}

fn contains_word(text: &str, phrase: &str) -> bool {
    text.match_indices(phrase).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + phrase.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Topic tab a conversation line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Section {
    Tasks,
    Notes,
    Reminders,
    Weather,
    Clear,
}

impl Section {
    pub fn label(&self) -> &'static str {
        match self {
            Section::Tasks => "Tasks",
            Section::Notes => "Notes",
            Section::Reminders => "Reminders",
            Section::Weather => "Weather",
            Section::Clear => "Clear",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label().to_lowercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speaker {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub id: Uuid,
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only conversation history, one list per section.
#[derive(Debug, Default)]
pub struct Transcript {
    sections: HashMap<Section, Vec<TranscriptEntry>>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, section: Section, speaker: Speaker, text: impl Into<String>) -> TranscriptEntry {
        let entry = TranscriptEntry {
            id: Uuid::now_v7(),
            speaker,
            text: text.into(),
            timestamp: Utc::now(),
        };
        self.sections.entry(section).or_default().push(entry.clone());
        entry
    }

    pub fn entries(&self, section: Section) -> &[TranscriptEntry] {
        self.sections.get(&section).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn last(&self, section: Section) -> Option<&TranscriptEntry> {
        self.entries(section).last()
    }

    /// True when the newest line in `section` is an assistant line containing `marker`.
    pub fn last_reply_contains(&self, section: Section, marker: &str) -> bool {
        self.last(section)
            .is_some_and(|e| e.speaker == Speaker::Assistant && e.text.contains(marker))
    }

    pub fn len(&self) -> usize {
        self.sections.values().map(Vec::len).sum()
    }

    /// Drops every section's history.
    pub fn reset(&mut self) {
        self.sections.clear();
    }
}

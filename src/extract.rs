//! Pulls structured fields out of free text.
//!
//! Nothing here fails: a field that cannot be found is `None` and the
//! accessors on [`Extraction`] supply the default.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveTime};
use regex::Regex;

use crate::backend::ResourceKind;
use crate::intent::{self, Intent};

static SLASH_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\b(?:date|due|on)\s*:?\s*)?\b(\d{1,2})/(\d{1,2})/(\d{4})\b").unwrap()
});
static ISO_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\b(?:date|due|on)\s*:?\s*)?\b(\d{4})-(\d{2})-(\d{2})\b").unwrap()
});
static CLOCK_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\bat\s+)?\b(\d{1,2})(?::(\d{2}))?\s*(am|pm)\b").unwrap()
});
static PRIORITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:priority|prio)\s*:?\s*(\d+)\b").unwrap()
});
static CITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bweather\s+(?:.*?\b(?:for|in|at|of)\s+)?(.+)").unwrap()
});
static QUICK_TASK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\btask\s+(.+)").unwrap());
static ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(\d+)\b").unwrap());

pub const DEFAULT_PRIORITY: u8 = 1;

/// Fields found in one utterance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub title: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub priority: Option<u8>,
    pub city: Option<String>,
    pub id: Option<String>,
}

impl Extraction {
    /// Whether the text named a date or a time of day.
    pub fn has_schedule(&self) -> bool {
        self.date.is_some() || self.time.is_some()
    }

    /// `YYYY-MM-DD`, plus ` HH:MM:SS` when a time of day was given.
    pub fn due_date(&self, today: NaiveDate) -> String {
        format_due(self.date.unwrap_or(today), self.time)
    }
}

/// Extract the fields relevant to `intent` from the raw utterance.
pub fn extract(intent: Intent, raw: &str) -> Extraction {
    let normalized = intent::normalize(raw);
    let mut out = Extraction {
        date: find_date(raw),
        time: find_time(raw),
        priority: PRIORITY.captures(raw).map(|c| clamp_priority(&c[1])),
        ..Default::default()
    };

    match intent {
        Intent::Add(_) => {
            out.title = intent::matched_trigger(&normalized, intent)
                .and_then(|trigger| text_after(raw, trigger))
                .map(strip_schedule)
                .filter(|t| !t.is_empty());
        }
        Intent::QuickTask => {
            out.title = QUICK_TASK
                .captures(raw)
                .map(|c| strip_schedule(&c[1]))
                .filter(|t| !t.is_empty());
        }
        Intent::Edit(_) | Intent::Delete(_) => {
            out.id = intent::matched_trigger(&normalized, intent)
                .and_then(|trigger| text_after(raw, trigger))
                .and_then(|rest| ID.captures(rest).map(|c| c[1].to_string()));
        }
        Intent::Weather => {
            out.city = CITY
                .captures(raw)
                .map(|c| clean(&c[1]))
                .filter(|c| !c.is_empty());
        }
        _ => {}
    }
    out
}

/// Read a date typed on its own: `YYYY-MM-DD` or `MM/DD/YYYY`, optional time.
/// A time without a date falls on `today`.
pub fn parse_due_input(raw: &str, today: NaiveDate) -> Option<String> {
    let date = find_date(raw);
    let time = find_time(raw);
    if date.is_none() && time.is_none() {
        return None;
    }
    Some(format_due(date.unwrap_or(today), time))
}

/// Integer parse with a default of 1; numbers outside 1..=5 are clamped.
pub fn parse_priority(raw: &str) -> u8 {
    let trimmed = raw.trim();
    if trimmed.parse::<i64>().is_ok() {
        clamp_priority(trimmed)
    } else {
        DEFAULT_PRIORITY
    }
}

fn clamp_priority(digits: &str) -> u8 {
    digits
        .parse::<i64>()
        .map(|n| n.clamp(1, 5) as u8)
        .unwrap_or(DEFAULT_PRIORITY)
}

fn format_due(date: NaiveDate, time: Option<NaiveTime>) -> String {
    match time {
        Some(t) => format!("{} {}", date.format("%Y-%m-%d"), t.format("%H:%M:%S")),
        None => date.format("%Y-%m-%d").to_string(),
    }
}

fn find_date(raw: &str) -> Option<NaiveDate> {
    if let Some(c) = SLASH_DATE.captures(raw) {
        let (month, day, year) = (c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?);
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    let c = ISO_DATE.captures(raw)?;
    NaiveDate::from_ymd_opt(c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?)
}

fn find_time(raw: &str) -> Option<NaiveTime> {
    let c = CLOCK_TIME.captures(raw)?;
    let hour: u32 = c[1].parse().ok()?;
    let minute: u32 = c.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
    if !(1..=12).contains(&hour) {
        return None;
    }
    let pm = c[3].eq_ignore_ascii_case("pm");
    let hour = match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, true) => h + 12,
        (h, false) => h,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Slice of `raw` following the first case-insensitive occurrence of `trigger`.
fn text_after<'a>(raw: &'a str, trigger: &str) -> Option<&'a str> {
    let lower = raw.to_lowercase();
    // lower-casing can change byte lengths outside ASCII
    if lower.len() != raw.len() {
        let start = raw.find(trigger)? + trigger.len();
        return Some(&raw[start..]);
    }
    let start = lower.find(trigger)? + trigger.len();
    Some(&raw[start..])
}

fn strip_schedule(text: &str) -> String {
    let text = SLASH_DATE.replace_all(text, " ");
    let text = ISO_DATE.replace_all(&text, " ");
    let text = CLOCK_TIME.replace_all(&text, " ");
    let text = PRIORITY.replace_all(&text, " ");
    clean(&text)
}

fn clean(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_matches(|c: char| c == ':' || c == ',' || c == '.' || c == '-' || c == '?' || c == '!')
        .trim()
        .to_string()
}

/// Bulk-delete target named in a clear-all answer.
pub fn clear_target(raw: &str) -> Option<ResourceKind> {
    match intent::normalize(raw).as_str() {
        "tasks" => Some(ResourceKind::Task),
        "notes" => Some(ResourceKind::Note),
        "reminders" => Some(ResourceKind::Reminder),
        "weather" | "weather history" => Some(ResourceKind::Weather),
        _ => None,
    }
}

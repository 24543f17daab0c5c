use chrono::{DateTime, FixedOffset, Local, NaiveDate, Utc};
use clap::ValueEnum;
use serde::Serialize;

// Domain data structures shared across modules.

#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub kind: String,
    pub repo: String,
    pub created_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

#[derive(Clone, Debug)]
pub struct EventPage {
    pub events: Vec<Event>,
    pub next_page: Option<u32>,
}

/// Collapses summary lines: one line per repository and event type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub repo: String,
    pub kind: String,
}

impl DedupKey {
    pub fn of(event: &Event) -> Self {
        Self {
            repo: event.repo.clone(),
            kind: event.kind.clone(),
        }
    }
}

/// Decides which calendar day a timestamp belongs to.
///
/// The same boundary computes "today" and attributes events, so an event
/// pushed shortly after midnight never lands on different days depending on
/// which side of the comparison looks at it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DayBoundary {
    Local,
    Fixed(FixedOffset),
}

impl DayBoundary {
    pub fn date_of(&self, at: DateTime<Utc>) -> NaiveDate {
        match self {
            DayBoundary::Local => at.with_timezone(&Local).date_naive(),
            DayBoundary::Fixed(offset) => at.with_timezone(offset).date_naive(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum MessageStyle {
    /// One line per repository and event type.
    #[default]
    PerType,
    /// One line per repository with its event count.
    PerRepository,
    /// Like `per-type`, with the pushed branch for push events.
    Detailed,
}

/// A single entry of a LINE push request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MessagePart {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Sticker {
        package_id: String,
        sticker_id: String,
    },
}

impl MessagePart {
    pub fn text(text: impl Into<String>) -> Self {
        MessagePart::Text { text: text.into() }
    }

    pub fn sticker(package_id: &str, sticker_id: &str) -> Self {
        MessagePart::Sticker {
            package_id: package_id.to_owned(),
            sticker_id: sticker_id.to_owned(),
        }
    }
}

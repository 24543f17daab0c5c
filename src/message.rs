use std::collections::HashSet;

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::debug;

use crate::domain::{DedupKey, Event, MessageStyle};

const DATE_FORMAT: &str = "%Y-%m-%d";
const PUSH_EVENT: &str = "PushEvent";
const DETAILS_UNSUPPORTED: &str = "details unsupported";

/// Renders the day report for `date`.
///
/// An empty window produces one of two fixed sentences: "no grass yet" while
/// the day is still running, "no grass grew" once `final_check` closes it.
pub fn build_message(
    events: &[Event],
    date: NaiveDate,
    final_check: bool,
    style: MessageStyle,
) -> String {
    let day = date.format(DATE_FORMAT);
    if events.is_empty() {
        return if final_check {
            format!("{day}の草が生えませんでした")
        } else {
            format!("{day}の草が生えていません")
        };
    }

    let mut message = format!("{day}の草www:\n");
    let lines = match style {
        MessageStyle::PerType => per_type_lines(events, |event| event.kind.clone()),
        MessageStyle::Detailed => per_type_lines(events, describe_event),
        MessageStyle::PerRepository => per_repository_lines(events),
    };
    for line in lines {
        message.push_str("\nリポジトリ: ");
        message.push_str(&line);
    }
    message
}

fn per_type_lines(events: &[Event], describe: impl Fn(&Event) -> String) -> Vec<String> {
    let mut seen = HashSet::new();
    events
        .iter()
        .filter(|event| seen.insert(DedupKey::of(event)))
        .map(|event| format!("{} ({})", event.repo, describe(event)))
        .collect()
}

fn per_repository_lines(events: &[Event]) -> Vec<String> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for event in events {
        match counts.iter_mut().find(|(repo, _)| *repo == event.repo) {
            Some((_, count)) => *count += 1,
            None => counts.push((event.repo.as_str(), 1)),
        }
    }

    counts
        .into_iter()
        .map(|(repo, count)| format!("{repo} ({count}件)"))
        .collect()
}

fn describe_event(event: &Event) -> String {
    if event.kind != PUSH_EVENT {
        return format!("{}: {DETAILS_UNSUPPORTED}", event.kind);
    }

    match pushed_branch(event) {
        Some(branch) => format!("{PUSH_EVENT}: {branch}"),
        None => PUSH_EVENT.to_owned(),
    }
}

fn pushed_branch(event: &Event) -> Option<String> {
    match PushPayload::deserialize(&event.payload) {
        Ok(payload) => Some(
            payload
                .git_ref
                .strip_prefix("refs/heads/")
                .unwrap_or(&payload.git_ref)
                .to_owned(),
        ),
        Err(err) => {
            debug!(repo = %event.repo, error = %err, "push payload without a usable ref");
            None
        }
    }
}

#[derive(Debug, Deserialize)]
struct PushPayload {
    #[serde(rename = "ref")]
    git_ref: String,
}

use std::{thread, time::Duration};

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{
    StatusCode,
    blocking::Client,
    header::{ACCEPT, LINK, USER_AGENT},
};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::{DayBoundary, Event, EventPage};

const GH_USERS: &str = "https://api.github.com/users";
const USER_AGENT_HEADER: &str = "kusa-bot/0.1";
const EVENTS_PER_PAGE: u32 = 100;

pub const DEFAULT_FETCH_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Anything that can list a user's public events one page at a time.
pub trait EventSource {
    fn list_public_events(&self, username: &str, page: u32) -> Result<EventPage, FetchError>;
}

/// How many times a single page request is attempted, and the pause between
/// attempts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_FETCH_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

pub struct GitHubClient {
    http: Client,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(token: Option<String>) -> Result<Self, FetchError> {
        let http = Client::builder()
            .user_agent(USER_AGENT_HEADER)
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(FetchError::Http)?;

        let token = token.filter(|token| !token.trim().is_empty());
        if token.is_none() {
            warn!("no GitHub token configured, falling back to anonymous rate limits");
        }

        Ok(Self { http, token })
    }
}

impl EventSource for GitHubClient {
    fn list_public_events(&self, username: &str, page: u32) -> Result<EventPage, FetchError> {
        let url = format!("{GH_USERS}/{username}/events/public");
        let mut request = self
            .http
            .get(url)
            .query(&[("page", page), ("per_page", EVENTS_PER_PAGE)])
            .header(USER_AGENT, USER_AGENT_HEADER)
            .header(ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let next_page = response
            .headers()
            .get(LINK)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_next_page);
        let events: Vec<EventResponse> = response.json()?;

        Ok(EventPage {
            events: events.into_iter().map(Event::from).collect(),
            next_page,
        })
    }
}

/// Collects every public event of `username` that falls on `date`.
///
/// Pages are walked from the first one until the provider stops advertising a
/// next page. A page that keeps failing aborts the whole fetch; partial
/// results are never returned.
pub fn fetch_events_for_date<S>(
    source: &S,
    username: &str,
    date: NaiveDate,
    boundary: DayBoundary,
    retry: &RetryPolicy,
) -> Result<Vec<Event>, FetchError>
where
    S: EventSource + ?Sized,
{
    let mut matched = Vec::new();
    let mut page = 1;

    loop {
        let fetched = fetch_page_with_retry(source, username, page, retry)?;
        let total = fetched.events.len();
        let before = matched.len();
        matched.extend(filter_by_date(fetched.events, date, boundary));
        debug!(
            page,
            total,
            matched = matched.len() - before,
            "fetched events page"
        );

        match fetched.next_page {
            // A cursor that does not move forward would loop forever.
            Some(next) if next > page => page = next,
            _ => break,
        }
    }

    info!(%date, username, events = matched.len(), "collected events for day");
    Ok(matched)
}

pub fn filter_by_date(
    events: impl IntoIterator<Item = Event>,
    date: NaiveDate,
    boundary: DayBoundary,
) -> Vec<Event> {
    events
        .into_iter()
        .filter(|event| boundary.date_of(event.created_at) == date)
        .collect()
}

fn fetch_page_with_retry<S>(
    source: &S,
    username: &str,
    page: u32,
    retry: &RetryPolicy,
) -> Result<EventPage, FetchError>
where
    S: EventSource + ?Sized,
{
    let attempts = retry.attempts.max(1);
    let mut attempt = 1;

    loop {
        match source.list_public_events(username, page) {
            Ok(fetched) => return Ok(fetched),
            Err(err) if !err.is_transient() => return Err(err),
            Err(err) if attempt >= attempts => {
                return Err(FetchError::Exhausted {
                    page,
                    attempts,
                    source: Box::new(err),
                });
            }
            Err(err) => {
                warn!(
                    page,
                    attempt,
                    max_attempts = attempts,
                    error = %err,
                    "events request failed, retrying in {:?}",
                    retry.delay
                );
                thread::sleep(retry.delay);
                attempt += 1;
            }
        }
    }
}

/// Extracts the `page` parameter of the `rel="next"` entry of a `Link` header.
pub fn parse_next_page(link: &str) -> Option<u32> {
    link.split(',').find_map(|entry| {
        let (target, params) = entry.split_once(';')?;
        if !params.split(';').any(|param| param.trim() == "rel=\"next\"") {
            return None;
        }

        let url = target.trim().trim_start_matches('<').trim_end_matches('>');
        let (_, query) = url.split_once('?')?;
        query
            .split('&')
            .find_map(|pair| pair.strip_prefix("page="))
            .and_then(|value| value.parse().ok())
    })
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("GitHub API request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("GitHub API responded with {0}")]
    Status(StatusCode),
    #[error("gave up on events page {page} after {attempts} attempts: {source}")]
    Exhausted {
        page: u32,
        attempts: u32,
        source: Box<FetchError>,
    },
}

impl FetchError {
    /// Whether another attempt at the same request could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Http(err) => !err.is_decode() && !err.is_builder(),
            FetchError::Status(status) => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            FetchError::Exhausted { .. } => false,
        }
    }
}

// Response payloads ---------------------------------------------------------

#[derive(Debug, Deserialize)]
struct EventResponse {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    repo: EventRepository,
    created_at: DateTime<Utc>,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct EventRepository {
    name: String,
}

impl From<EventResponse> for Event {
    fn from(item: EventResponse) -> Self {
        Event {
            kind: item.kind.unwrap_or_default(),
            repo: item.repo.name,
            created_at: item.created_at,
            payload: item.payload,
        }
    }
}

// -------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::FixedOffset;

    use super::*;
    use crate::testing::{ScriptedSource, event, page};

    fn utc() -> DayBoundary {
        DayBoundary::Fixed(FixedOffset::east_opt(0).expect("offset"))
    }

    fn day(s: &str) -> NaiveDate {
        s.parse().expect("date")
    }

    fn no_delay(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            delay: Duration::ZERO,
        }
    }

    fn bad_gateway() -> FetchError {
        FetchError::Status(StatusCode::BAD_GATEWAY)
    }

    #[test]
    fn parse_next_page_reads_next_relation() {
        let link = "<https://api.github.com/user/1/events/public?page=2&per_page=100>; rel=\"next\", \
                    <https://api.github.com/user/1/events/public?page=3&per_page=100>; rel=\"last\"";
        assert_eq!(parse_next_page(link), Some(2));
    }

    #[test]
    fn parse_next_page_ignores_links_without_next() {
        let link = "<https://api.github.com/user/1/events/public?per_page=100&page=1>; rel=\"first\", \
                    <https://api.github.com/user/1/events/public?per_page=100&page=2>; rel=\"prev\"";
        assert_eq!(parse_next_page(link), None);
        assert_eq!(parse_next_page(""), None);
    }

    #[test]
    fn event_response_maps_into_domain_event() {
        let raw = r#"{
            "id": "1",
            "type": "PushEvent",
            "actor": { "login": "octocat" },
            "repo": { "id": 7, "name": "octocat/hello", "url": "https://api.github.com/repos/octocat/hello" },
            "payload": { "ref": "refs/heads/main", "head": "abc" },
            "public": true,
            "created_at": "2024-03-01T10:00:00Z"
        }"#;
        let response: EventResponse = serde_json::from_str(raw).expect("decode");
        let event = Event::from(response);

        assert_eq!(event.kind, "PushEvent");
        assert_eq!(event.repo, "octocat/hello");
        assert_eq!(event.payload["ref"], "refs/heads/main");
    }

    #[test]
    fn collects_matches_across_pages() {
        let source = ScriptedSource::new(vec![
            Ok(page(
                vec![
                    event("a/b", "PushEvent", "2024-03-01T10:00:00Z"),
                    event("a/b", "PushEvent", "2024-02-29T10:00:00Z"),
                ],
                Some(2),
            )),
            Ok(page(
                vec![event("c/d", "IssuesEvent", "2024-03-01T01:00:00Z")],
                None,
            )),
        ]);

        let events =
            fetch_events_for_date(&source, "octocat", day("2024-03-01"), utc(), &no_delay(3))
                .expect("fetch");

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].repo, "a/b");
        assert_eq!(events[1].repo, "c/d");
        assert_eq!(source.requested_pages(), vec![1, 2]);
    }

    #[test]
    fn no_matching_events_is_not_an_error() {
        let source = ScriptedSource::new(vec![Ok(page(
            vec![event("a/b", "PushEvent", "2024-02-29T10:00:00Z")],
            None,
        ))]);

        let events =
            fetch_events_for_date(&source, "octocat", day("2024-03-01"), utc(), &no_delay(3))
                .expect("fetch");
        assert!(events.is_empty());
    }

    #[test]
    fn retries_are_transparent_on_eventual_success() {
        let listed = vec![event("a/b", "PushEvent", "2024-03-01T10:00:00Z")];
        let source = ScriptedSource::new(vec![
            Err(bad_gateway()),
            Err(bad_gateway()),
            Ok(page(listed.clone(), None)),
        ]);

        let events =
            fetch_events_for_date(&source, "octocat", day("2024-03-01"), utc(), &no_delay(3))
                .expect("fetch");

        assert_eq!(events, listed);
        assert_eq!(source.requested_pages(), vec![1, 1, 1]);
    }

    #[test]
    fn exhausted_retries_surface_an_error() {
        let source = ScriptedSource::new(vec![
            Ok(page(
                vec![event("a/b", "PushEvent", "2024-03-01T10:00:00Z")],
                Some(2),
            )),
            Err(bad_gateway()),
            Err(bad_gateway()),
            Err(bad_gateway()),
        ]);

        let result =
            fetch_events_for_date(&source, "octocat", day("2024-03-01"), utc(), &no_delay(3));

        assert!(matches!(
            result,
            Err(FetchError::Exhausted {
                page: 2,
                attempts: 3,
                ..
            })
        ));
        assert_eq!(source.requested_pages(), vec![1, 2, 2, 2]);
    }

    #[test]
    fn client_errors_are_not_retried() {
        let source = ScriptedSource::new(vec![Err(FetchError::Status(StatusCode::NOT_FOUND))]);

        let result =
            fetch_events_for_date(&source, "ghost", day("2024-03-01"), utc(), &no_delay(3));

        assert!(matches!(
            result,
            Err(FetchError::Status(status)) if status == StatusCode::NOT_FOUND
        ));
        assert_eq!(source.requested_pages(), vec![1]);
    }

    #[test]
    fn stale_next_cursor_stops_pagination() {
        let source = ScriptedSource::new(vec![Ok(page(Vec::new(), Some(1)))]);

        let events =
            fetch_events_for_date(&source, "octocat", day("2024-03-01"), utc(), &no_delay(3))
                .expect("fetch");
        assert!(events.is_empty());
        assert_eq!(source.requested_pages(), vec![1]);
    }

    #[test]
    fn filtering_by_date_is_idempotent() {
        let events = vec![
            event("a/b", "PushEvent", "2024-03-01T00:00:00Z"),
            event("a/b", "PushEvent", "2024-03-01T23:59:59Z"),
            event("c/d", "IssuesEvent", "2024-03-02T00:00:00Z"),
        ];
        let date = day("2024-03-01");

        let once = filter_by_date(events, date, utc());
        let twice = filter_by_date(once.clone(), date, utc());

        assert_eq!(once.len(), 2);
        assert_eq!(once, twice);
    }
}

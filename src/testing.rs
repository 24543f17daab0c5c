//! Test doubles for the GitHub and LINE capabilities.

use std::{cell::RefCell, collections::VecDeque};

use serde_json::json;

use crate::{
    domain::{Event, EventPage, MessagePart},
    github::{EventSource, FetchError},
    line::{MessagePusher, NotifyError},
};

pub fn event(repo: &str, kind: &str, created_at: &str) -> Event {
    Event {
        kind: kind.to_owned(),
        repo: repo.to_owned(),
        created_at: created_at.parse().expect("timestamp"),
        payload: json!({}),
    }
}

pub fn page(events: Vec<Event>, next_page: Option<u32>) -> EventPage {
    EventPage { events, next_page }
}

/// Replays canned page results in order and records which pages were asked for.
pub struct ScriptedSource {
    responses: RefCell<VecDeque<Result<EventPage, FetchError>>>,
    requested: RefCell<Vec<u32>>,
}

impl ScriptedSource {
    pub fn new(responses: Vec<Result<EventPage, FetchError>>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            requested: RefCell::new(Vec::new()),
        }
    }

    pub fn requested_pages(&self) -> Vec<u32> {
        self.requested.borrow().clone()
    }
}

impl EventSource for ScriptedSource {
    fn list_public_events(&self, _username: &str, page: u32) -> Result<EventPage, FetchError> {
        self.requested.borrow_mut().push(page);
        self.responses
            .borrow_mut()
            .pop_front()
            .expect("unexpected events request")
    }
}

/// Records every push; the first `failures` pushes are rejected.
#[derive(Default)]
pub struct RecordingPusher {
    failures: RefCell<usize>,
    pushed: RefCell<Vec<(String, Vec<MessagePart>)>>,
}

impl RecordingPusher {
    pub fn failing(failures: usize) -> Self {
        Self {
            failures: RefCell::new(failures),
            pushed: RefCell::new(Vec::new()),
        }
    }

    pub fn pushed(&self) -> Vec<(String, Vec<MessagePart>)> {
        self.pushed.borrow().clone()
    }
}

impl MessagePusher for RecordingPusher {
    fn push(&self, to: &str, parts: &[MessagePart]) -> Result<(), NotifyError> {
        self.pushed
            .borrow_mut()
            .push((to.to_owned(), parts.to_vec()));

        let mut failures = self.failures.borrow_mut();
        if *failures > 0 {
            *failures -= 1;
            return Err(NotifyError::Rejected {
                status: 500,
                message: "line is down".to_owned(),
            });
        }
        Ok(())
    }
}

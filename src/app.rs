use std::process::ExitCode;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::{
    config::Config,
    github::{self, EventSource},
    line::{self, MessagePusher},
    message::build_message,
};

/// What reached the recipient by the end of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    SummaryDelivered,
    ErrorReported,
    NothingDelivered,
}

impl RunOutcome {
    /// Only a run that got no message at all through counts as failed.
    pub fn exit_code(self) -> ExitCode {
        match self {
            RunOutcome::SummaryDelivered | RunOutcome::ErrorReported => ExitCode::SUCCESS,
            RunOutcome::NothingDelivered => ExitCode::FAILURE,
        }
    }
}

/// Fetches the target day's events, renders the report and pushes it.
///
/// A fetch failure never turns into a "no activity" report: the recipient
/// gets the error text instead.
pub fn run<S, P>(config: &Config, source: &S, pusher: &P, now: DateTime<Utc>) -> RunOutcome
where
    S: EventSource + ?Sized,
    P: MessagePusher + ?Sized,
{
    let date = config.target_date(now);
    info!(
        %date,
        username = %config.github_username,
        final_check = config.final_check,
        "checking activity"
    );

    let events = match github::fetch_events_for_date(
        source,
        &config.github_username,
        date,
        config.day_boundary(),
        &config.retry_policy(),
    ) {
        Ok(events) => events,
        Err(err) => {
            error!(error = %err, "failed to fetch GitHub events");
            return report_failure(pusher, &config.line_user_id, &err);
        }
    };

    let message = build_message(&events, date, config.final_check, config.style);
    match line::send_summary(pusher, &config.line_user_id, &message, !events.is_empty()) {
        Ok(()) => RunOutcome::SummaryDelivered,
        Err(err) => {
            error!(error = %err, "failed to deliver summary");
            report_failure(pusher, &config.line_user_id, &err)
        }
    }
}

pub fn report_failure<P>(pusher: &P, to: &str, err: &dyn std::error::Error) -> RunOutcome
where
    P: MessagePusher + ?Sized,
{
    if line::send_error(pusher, to, err) {
        RunOutcome::ErrorReported
    } else {
        RunOutcome::NothingDelivered
    }
}

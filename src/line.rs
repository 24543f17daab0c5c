use reqwest::{
    blocking::Client,
    header::{CONTENT_TYPE, USER_AGENT},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::{domain::MessagePart, github::HTTP_TIMEOUT};

const LINE_PUSH: &str = "https://api.line.me/v2/bot/message/push";
const USER_AGENT_HEADER: &str = "kusa-bot/0.1";

pub const STICKER_PACKAGE_ID: &str = "11537";
pub const STICKER_ID: &str = "52002735";

/// Anything that can deliver an ordered list of message parts to a recipient.
pub trait MessagePusher {
    fn push(&self, to: &str, parts: &[MessagePart]) -> Result<(), NotifyError>;
}

pub struct LineClient {
    http: Client,
    channel_token: String,
}

impl LineClient {
    /// Both channel credentials must be present. Only the token is sent with
    /// push requests.
    pub fn new(channel_secret: &str, channel_token: &str) -> Result<Self, NotifyError> {
        if channel_secret.trim().is_empty() || channel_token.trim().is_empty() {
            return Err(NotifyError::MissingCredentials);
        }

        let http = Client::builder()
            .user_agent(USER_AGENT_HEADER)
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(NotifyError::Http)?;

        Ok(Self {
            http,
            channel_token: channel_token.to_owned(),
        })
    }
}

impl MessagePusher for LineClient {
    fn push(&self, to: &str, parts: &[MessagePart]) -> Result<(), NotifyError> {
        let response = self
            .http
            .post(LINE_PUSH)
            .header(USER_AGENT, USER_AGENT_HEADER)
            .header(CONTENT_TYPE, "application/json")
            .bearer_auth(&self.channel_token)
            .json(&PushRequest {
                to,
                messages: parts,
            })
            .send()?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        // LINE reports failures as `{"message": "..."}`; fall back to the
        // status text when the body is something else.
        let message = response
            .json::<LineErrorResponse>()
            .map(|body| body.message)
            .unwrap_or_else(|_| status.canonical_reason().unwrap_or("unknown").to_owned());
        Err(NotifyError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

/// Pushes the day report, with a sticker when there is activity to celebrate.
pub fn send_summary<P>(
    pusher: &P,
    to: &str,
    message: &str,
    has_events: bool,
) -> Result<(), NotifyError>
where
    P: MessagePusher + ?Sized,
{
    let mut parts = vec![MessagePart::text(message)];
    if has_events {
        parts.push(MessagePart::sticker(STICKER_PACKAGE_ID, STICKER_ID));
    }

    pusher.push(to, &parts)?;
    info!(parts = parts.len(), has_events, "summary delivered");
    Ok(())
}

/// Best-effort report of a failure to the recipient. Returns whether it got
/// through; a failure here is only logged.
pub fn send_error<P>(pusher: &P, to: &str, error: &dyn std::error::Error) -> bool
where
    P: MessagePusher + ?Sized,
{
    let parts = [MessagePart::text(format!("Error: {error}"))];
    match pusher.push(to, &parts) {
        Ok(()) => {
            info!("error notification delivered");
            true
        }
        Err(err) => {
            error!(error = %err, "failed to deliver error notification");
            false
        }
    }
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("LINE API request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("LINE API rejected the push ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("LINE channel secret and token are both required")]
    MissingCredentials,
}

// Wire payloads -------------------------------------------------------------

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    to: &'a str,
    messages: &'a [MessagePart],
}

#[derive(Debug, Deserialize)]
struct LineErrorResponse {
    message: String,
}

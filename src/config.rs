use std::time::Duration;

use chrono::{DateTime, Days, FixedOffset, NaiveDate, Utc};
use clap::{Parser, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt};

use crate::{
    domain::{DayBoundary, MessageStyle},
    github::{DEFAULT_FETCH_ATTEMPTS, DEFAULT_RETRY_DELAY, RetryPolicy},
};

/// Reports whether a GitHub user grew their contribution graph today, over LINE.
///
/// Every option can also come from the environment (or a `.env` file).
#[derive(Parser, Debug, Clone)]
#[command(name = "kusa-bot", version)]
pub struct Config {
    /// GitHub token; the public feed also works anonymously with lower limits
    #[arg(long, env = "GH_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// GitHub user whose public activity is reported
    #[arg(long, env = "GH_USERNAME")]
    pub github_username: String,

    #[arg(long, env = "LINE_CHANNEL_SECRET", hide_env_values = true)]
    pub line_channel_secret: String,

    #[arg(long, env = "LINE_CHANNEL_TOKEN", hide_env_values = true)]
    pub line_channel_token: String,

    /// LINE user that receives the report
    #[arg(long, env = "LINE_USER_ID")]
    pub line_user_id: String,

    /// Report on yesterday with day-end wording; from the environment only `true` enables it
    #[arg(long, env = "IS_FINAL_CHECK", value_parser = parse_final_check)]
    pub final_check: bool,

    #[arg(long, env = "MESSAGE_STYLE", value_enum, default_value_t = MessageStyle::PerType)]
    pub style: MessageStyle,

    /// Offset that defines where a day starts, e.g. `+09:00`; host local time when unset
    #[arg(long, env = "DAY_UTC_OFFSET", value_parser = parse_utc_offset)]
    pub utc_offset: Option<FixedOffset>,

    /// Attempts per events page before giving up
    #[arg(
        long,
        env = "FETCH_ATTEMPTS",
        default_value_t = DEFAULT_FETCH_ATTEMPTS,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub fetch_attempts: u32,

    /// Pause between attempts, in seconds
    #[arg(long, env = "RETRY_DELAY_SECS", default_value_t = DEFAULT_RETRY_DELAY.as_secs())]
    pub retry_delay_secs: u64,

    /// Default log filter; `RUST_LOG` takes precedence
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Config {
    pub fn day_boundary(&self) -> DayBoundary {
        match self.utc_offset {
            Some(offset) => DayBoundary::Fixed(offset),
            None => DayBoundary::Local,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.fetch_attempts,
            delay: Duration::from_secs(self.retry_delay_secs),
        }
    }

    /// The day being reported: today, or yesterday for the final check.
    pub fn target_date(&self, now: DateTime<Utc>) -> NaiveDate {
        let today = self.day_boundary().date_of(now);
        if self.final_check {
            today.checked_sub_days(Days::new(1)).unwrap_or(today)
        } else {
            today
        }
    }

    pub fn init_logging(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.log_level));

        match self.log_format {
            LogFormat::Json => fmt().json().with_env_filter(filter).init(),
            LogFormat::Pretty => fmt().with_env_filter(filter).init(),
        }
    }
}

/// Anything but `true` (ignoring case) leaves the final check off, so a
/// blank or unexpected variable never aborts the run.
fn parse_final_check(raw: &str) -> Result<bool, String> {
    Ok(raw.trim().eq_ignore_ascii_case("true"))
}

fn parse_utc_offset(raw: &str) -> Result<FixedOffset, String> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(|| "invalid offset".to_owned());
    }

    let (sign, rest) = match raw.split_at_checked(1) {
        Some(("+", rest)) => (1, rest),
        Some(("-", rest)) => (-1, rest),
        _ => return Err(format!("expected `+HH:MM` or `-HH:MM`, got `{raw}`")),
    };
    let (hours, minutes) = rest.split_once(':').unwrap_or((rest, "0"));
    let hours: u32 = hours
        .parse()
        .map_err(|_| format!("invalid hours in offset `{raw}`"))?;
    let minutes: u32 = minutes
        .parse()
        .map_err(|_| format!("invalid minutes in offset `{raw}`"))?;
    if hours >= 24 || minutes >= 60 {
        return Err(format!("offset `{raw}` is out of range"));
    }

    let seconds = (hours * 3600 + minutes * 60) as i32;
    FixedOffset::east_opt(sign * seconds)
        .ok_or_else(|| format!("offset `{raw}` is out of range"))
}

mod app;
mod config;
mod domain;
mod github;
mod line;
mod message;
#[cfg(test)]
mod testing;

use std::process::ExitCode;

use chrono::Utc;
use clap::Parser;
use tracing::error;

use app::RunOutcome;
use config::Config;
use github::GitHubClient;
use line::LineClient;

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    let config = Config::parse();
    config.init_logging();

    let pusher = match LineClient::new(&config.line_channel_secret, &config.line_channel_token) {
        Ok(pusher) => pusher,
        Err(err) => {
            error!(error = %err, "failed to create LINE client");
            return RunOutcome::NothingDelivered.exit_code();
        }
    };

    let source = match GitHubClient::new(config.github_token.clone()) {
        Ok(source) => source,
        Err(err) => {
            error!(error = %err, "failed to create GitHub client");
            return app::report_failure(&pusher, &config.line_user_id, &err).exit_code();
        }
    };

    app::run(&config, &source, &pusher, Utc::now()).exit_code()
}

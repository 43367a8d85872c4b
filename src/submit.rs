/*!
Leaderboard submission: a one-shot POST of the final aggregate, retried a
few times on read timeouts and otherwise fire-and-forget.
*/

use std::{env, fmt, thread, time::Duration};

use serde_json::json;

use crate::grade::FinalResult;
use crate::prelude::*;

pub const SUBMIT_ATTEMPTS: u32 = 3;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const RETRY_DELAY: Duration = Duration::from_secs(10);

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("'{}' missing from the environment", name))]
    MissingEnv { name: String },
}

fn require_env(name: &str) -> Result<String, Error> {
    env::var(name).ok().context(MissingEnv {
        name: name.to_owned(),
    })
}

/// Submission credentials and identity, scoped to one run.
///
/// The token never leaves this struct: `Debug` redacts it and it is only
/// attached to the payload after all logging of that payload happened.
pub struct SubmitConfig {
    url: String,
    token: String,
    user: String,
}

impl fmt::Debug for SubmitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmitConfig")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("user", &self.user)
            .finish()
    }
}

impl SubmitConfig {
    /// Reads the configuration from `LEADERBOARD_URL`,
    /// `LEADERBOARD_AUTH_TOKEN` and `CI_COMMIT_REF_NAME`.
    ///
    /// The token variable is removed from the process environment right
    /// after reading so spawned solvers never inherit it.
    pub fn from_env() -> Result<Self, Error> {
        let url = require_env("LEADERBOARD_URL")?;
        let token = require_env("LEADERBOARD_AUTH_TOKEN")?;
        env::remove_var("LEADERBOARD_AUTH_TOKEN");

        // The CI branch name doubles as the submitter identity.
        let branch = require_env("CI_COMMIT_REF_NAME")?;
        let user = match branch.find("-2024-") {
            Some(cut) => branch[..cut].to_owned(),
            None => branch,
        };

        Ok(SubmitConfig { url, token, user })
    }
}

/// Posts the final result to the leaderboard.
///
/// Transport failures never fail the grading run: a read timeout is
/// retried with a fixed backoff, anything else is logged and abandoned.
pub fn submit(config: &SubmitConfig, result: &FinalResult) {
    let mut payload = result.to_json();
    debug!("Posting request:\n{}", payload);

    payload["user_id"] = json!(config.user);
    payload["auth_token"] = json!(config.token);

    let client = match reqwest::blocking::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
    {
        Ok(client) => client,
        Err(error) => {
            error!("Failed to set up the HTTP client: {}", error);
            return;
        }
    };

    let url = format!("{}/submit", config.url);
    for attempt in 1..=SUBMIT_ATTEMPTS {
        match client.post(&url).json(&payload).send() {
            Ok(response) => {
                debug!("Got response: {}", response.status());
                return;
            }
            Err(error) if error.is_timeout() => {
                error!(
                    "Timeout while submitting result (attempt {}/{}), retrying...",
                    attempt, SUBMIT_ATTEMPTS
                );
                thread::sleep(RETRY_DELAY);
            }
            Err(error) => {
                error!("Failed to submit result: {}", error);
                return;
            }
        }
    }

    error!("Failed to submit result after {} attempts!", SUBMIT_ATTEMPTS);
}

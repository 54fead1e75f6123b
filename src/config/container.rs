// ABOUTME: How the started container is kept alive and how the outgoing one is stopped.
// ABOUTME: Both values are handed to the container CLI unchanged.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RestartPolicyError {
    #[error("unknown restart policy '{0}' (expected no, always, unless-stopped or on-failure[:N])")]
    Unknown(String),

    #[error("on-failure retry count '{0}' is not a number")]
    InvalidRetries(String),
}

/// The `--restart` value for the new container.
///
/// With `always` or `on-failure`, a container whose migrations fail comes back
/// up in a loop; startup observation treats restarting as failed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum RestartPolicy {
    No,
    Always,
    #[default]
    UnlessStopped,
    OnFailure { max_retries: Option<u32> },
}

impl FromStr for RestartPolicy {
    type Err = RestartPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, retries) = match s.split_once(':') {
            Some((name, retries)) => (name, Some(retries)),
            None => (s, None),
        };
        match (name, retries) {
            ("no", None) => Ok(RestartPolicy::No),
            ("always", None) => Ok(RestartPolicy::Always),
            ("unless-stopped", None) => Ok(RestartPolicy::UnlessStopped),
            ("on-failure", None) => Ok(RestartPolicy::OnFailure { max_retries: None }),
            ("on-failure", Some(retries)) => retries
                .parse()
                .map(|n| RestartPolicy::OnFailure {
                    max_retries: Some(n),
                })
                .map_err(|_| RestartPolicyError::InvalidRetries(retries.to_string())),
            _ => Err(RestartPolicyError::Unknown(s.to_string())),
        }
    }
}

impl TryFrom<String> for RestartPolicy {
    type Error = RestartPolicyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestartPolicy::No => f.write_str("no"),
            RestartPolicy::Always => f.write_str("always"),
            RestartPolicy::UnlessStopped => f.write_str("unless-stopped"),
            RestartPolicy::OnFailure { max_retries } => {
                f.write_str("on-failure")?;
                match max_retries {
                    Some(n) => write!(f, ":{n}"),
                    None => Ok(()),
                }
            }
        }
    }
}

const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Grace period between SIGTERM and SIGKILL for the container being replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StopConfig {
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

// ABOUTME: Error types for the deploying stage outside the transition steps.
// ABOUTME: Covers target locking and opening the remote session.

use chrono::{DateTime, Utc};

use crate::ssh;

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Another deployer holds the remote lock.
    #[error("deploy lock held by {holder} (pid {pid}) since {started_at}; use --force to break it")]
    LockHeld {
        holder: String,
        pid: u32,
        started_at: DateTime<Utc>,
    },

    #[error("deploy lock error: {0}")]
    Lock(String),

    #[error("failed to connect to {target}: {source}")]
    Connect { target: String, source: ssh::Error },
}

impl DeployError {
    pub(crate) fn lock_error(message: impl Into<String>) -> Self {
        DeployError::Lock(message.into())
    }
}

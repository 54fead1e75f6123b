// ABOUTME: Errors from the SSH transport: reaching the host, proving identity, running commands.
// ABOUTME: Key material never appears in these messages, only where it was looked for.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot reach {address}: {reason}")]
    Connect { address: String, reason: String },

    #[error("{user}@{address} rejected every offered key")]
    Rejected { user: String, address: String },

    #[error("no SSH credential available: {0}")]
    NoCredential(String),

    #[error("cannot load SSH key from {origin}: {reason}")]
    Key { origin: String, reason: String },

    #[error("remote command could not run: {0}")]
    Exec(String),

    #[error("remote command timed out after {0:?}")]
    Timeout(Duration),

    #[error("session closed before the command reported an exit status")]
    ChannelClosed,

    #[error("SSH protocol error: {0}")]
    Protocol(#[from] russh::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

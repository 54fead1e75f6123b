// ABOUTME: SSH transport for the remote executor, built on russh.
// ABOUTME: Key-file, environment, or agent authentication with known_hosts verification.

mod auth;
mod error;
mod host_keys;
mod session;

pub use auth::KeySource;
pub use error::{Error, Result};
pub use session::{CommandOutput, Session, SessionConfig, SshConnector};

// ABOUTME: Narrow interface to an authenticated command channel on the target host.
// ABOUTME: Implemented by the SSH session; tests substitute scripted shells.

use crate::ssh::{CommandOutput, Result};
use async_trait::async_trait;

use super::DeploymentTarget;

/// A shell script plus the text that may be logged in its place.
///
/// Scripts can carry secrets (registry passwords, env files); the display
/// form never does.
#[derive(Clone)]
pub struct RemoteCommand {
    script: String,
    display: String,
}

impl RemoteCommand {
    /// A command with nothing to hide.
    pub fn new(script: impl Into<String>) -> Self {
        let script = script.into();
        Self {
            display: script.clone(),
            script,
        }
    }

    /// A command whose script must not be logged.
    pub fn redacted(script: impl Into<String>, display: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            display: display.into(),
        }
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    pub fn display(&self) -> &str {
        &self.display
    }
}

impl std::fmt::Debug for RemoteCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RemoteCommand").field(&self.display).finish()
    }
}

/// An open, authenticated session able to run commands on one host.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    async fn exec(&self, command: &RemoteCommand) -> Result<CommandOutput>;

    /// Release the session. Called on every exit path of a transition.
    async fn close(self) -> Result<()>;
}

/// Opens shells for deployment targets.
#[async_trait]
pub trait Connector: Send + Sync {
    type Shell: RemoteShell;

    async fn connect(&self, target: &DeploymentTarget) -> Result<Self::Shell>;
}

/// Quote a value for a POSIX shell.
pub fn quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', "'\\''"))
}

// ABOUTME: An authenticated SSH session to one deployment target and its command channel.
// ABOUTME: Implements the remote shell seam the executor and startup observer run through.

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::auth::{Credential, KeySource};
use super::host_keys::HostKeyPolicy;
use super::{Error, Result};
use crate::remote::{Connector, DeploymentTarget, RemoteCommand, RemoteShell};

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);
const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(30);

/// How to reach and authenticate to a target.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Reference to the private key. `None` tries the agent, then ~/.ssh.
    pub key: Option<KeySource>,
    /// Overrides ~/.ssh/known_hosts.
    pub known_hosts: Option<PathBuf>,
    pub trust_first_connection: bool,
    pub command_timeout: Duration,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            user: user.into(),
            key: None,
            known_hosts: None,
            trust_first_connection: false,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn port(self, port: u16) -> Self {
        Self { port, ..self }
    }

    pub fn key(self, key: KeySource) -> Self {
        Self {
            key: Some(key),
            ..self
        }
    }

    pub fn known_hosts(self, path: impl Into<PathBuf>) -> Self {
        Self {
            known_hosts: Some(path.into()),
            ..self
        }
    }

    pub fn trust_first_connection(self, trust: bool) -> Self {
        Self {
            trust_first_connection: trust,
            ..self
        }
    }

    pub fn command_timeout(self, timeout: Duration) -> Self {
        Self {
            command_timeout: timeout,
            ..self
        }
    }

    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Result of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: u32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Short human-readable reason for a failure: stderr if any, else stdout.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        let text = if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        };
        format!("exit {}: {}", self.exit_code, text)
    }
}

/// Accumulates channel traffic until the command has both exited and closed its output.
#[derive(Debug, Default)]
struct Collected {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_code: Option<u32>,
    eof: bool,
}

impl Collected {
    fn stdout(&mut self, data: &[u8]) {
        self.stdout.extend_from_slice(data);
    }

    /// Extended data type 1 is stderr; others are ignored.
    fn extended(&mut self, ext: u32, data: &[u8]) {
        if ext == 1 {
            self.stderr.extend_from_slice(data);
        }
    }

    fn exited(&mut self, code: u32) -> bool {
        self.exit_code = Some(code);
        self.eof
    }

    fn eof(&mut self) -> bool {
        self.eof = true;
        self.exit_code.is_some()
    }

    fn finish(self) -> Result<CommandOutput> {
        let exit_code = self.exit_code.ok_or(Error::ChannelClosed)?;
        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&self.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&self.stderr).into_owned(),
        })
    }
}

/// An open session. Dropping it without [`Session::close`] leaves the TCP teardown to russh.
pub struct Session {
    address: String,
    command_timeout: Duration,
    handle: Handle<HostKeyPolicy>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub async fn connect(config: &SessionConfig) -> Result<Self> {
        let address = config.address();
        let credential = Credential::resolve(config.key.as_ref()).await?;

        let policy = HostKeyPolicy::new(
            &config.host,
            config.port,
            config.known_hosts.clone(),
            config.trust_first_connection,
        );
        let russh_config = client::Config {
            inactivity_timeout: Some(INACTIVITY_TIMEOUT),
            ..Default::default()
        };

        let mut handle = client::connect(
            Arc::new(russh_config),
            (config.host.as_str(), config.port),
            policy,
        )
        .await
        .map_err(|e| Error::Connect {
            address: address.clone(),
            reason: e.to_string(),
        })?;

        if !credential.offer(&mut handle, &config.user).await? {
            return Err(Error::Rejected {
                user: config.user.clone(),
                address,
            });
        }

        tracing::debug!(%address, user = %config.user, "ssh session established");
        Ok(Self {
            address,
            command_timeout: config.command_timeout,
            handle,
        })
    }

    /// Run a script through the remote login shell, bounded by the session's command timeout.
    pub async fn run(&self, script: &str) -> Result<CommandOutput> {
        tokio::time::timeout(self.command_timeout, self.run_unbounded(script))
            .await
            .map_err(|_| Error::Timeout(self.command_timeout))?
    }

    async fn run_unbounded(&self, script: &str) -> Result<CommandOutput> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| Error::Exec(format!("cannot open channel: {}", e)))?;
        channel
            .exec(true, script)
            .await
            .map_err(|e| Error::Exec(e.to_string()))?;

        let mut collected = Collected::default();
        while let Some(message) = channel.wait().await {
            let done = match message {
                ChannelMsg::Data { data } => {
                    collected.stdout(&data);
                    false
                }
                ChannelMsg::ExtendedData { data, ext } => {
                    collected.extended(ext, &data);
                    false
                }
                ChannelMsg::ExitStatus { exit_status } => collected.exited(exit_status),
                ChannelMsg::Eof => collected.eof(),
                ChannelMsg::Close => true,
                _ => false,
            };
            if done {
                break;
            }
        }
        collected.finish()
    }

    pub async fn close(self) -> Result<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await?;
        tracing::debug!(address = %self.address, "ssh session closed");
        Ok(())
    }
}

#[async_trait]
impl RemoteShell for Session {
    async fn exec(&self, command: &RemoteCommand) -> Result<CommandOutput> {
        tracing::trace!(address = %self.address, command = command.display(), "exec");
        self.run(command.script()).await
    }

    async fn close(self) -> Result<()> {
        Session::close(self).await
    }
}

/// Opens real SSH sessions to deployment targets.
#[derive(Debug, Clone, Copy, Default)]
pub struct SshConnector;

#[async_trait]
impl Connector for SshConnector {
    type Shell = Session;

    async fn connect(&self, target: &DeploymentTarget) -> Result<Session> {
        Session::connect(&target.session_config()).await
    }
}

// ABOUTME: Target server configuration for SSH connections.
// ABOUTME: Parses formats like "host", "user@host", "host:port", "user@host:port".

use crate::remote::{DeploymentTarget, RuntimeType};
use crate::ssh::{KeySource, SessionConfig};
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;

/// The host a service is deployed to.
///
/// Written either as an address string or as a mapping:
///
/// ```yaml
/// server: deploy@web1.internal:2222
/// server:
///   host: web1.internal
///   key: { env: SSH_PRIVATE_KEY }
///   runtime: podman
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    /// Where the SSH private key comes from. Falls back to the agent, then ~/.ssh.
    pub key: Option<KeySource>,
    pub known_hosts: Option<PathBuf>,
    /// Container CLI on the host; detected when unset.
    pub runtime: Option<RuntimeType>,
    pub trust_first_connection: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ServerEntry {
    Address(String),
    Detailed(ServerFields),
}

#[derive(Deserialize)]
struct ServerFields {
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    key: Option<KeySource>,
    #[serde(default)]
    known_hosts: Option<PathBuf>,
    #[serde(default)]
    runtime: Option<RuntimeType>,
    #[serde(default = "default_trust_first_connection")]
    trust_first_connection: bool,
}

impl<'de> Deserialize<'de> for ServerConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        ServerEntry::deserialize(deserializer)?
            .into_config()
            .map_err(serde::de::Error::custom)
    }
}

impl ServerEntry {
    fn into_config(self) -> Result<ServerConfig, String> {
        let fields = match self {
            ServerEntry::Address(address) => return ServerConfig::parse(&address),
            ServerEntry::Detailed(fields) => fields,
        };
        if fields.host.trim().is_empty() {
            return Err("hostname cannot be empty".to_string());
        }
        Ok(ServerConfig {
            host: fields.host,
            port: fields.port,
            user: fields.user,
            key: fields.key,
            known_hosts: fields.known_hosts,
            runtime: fields.runtime,
            trust_first_connection: fields.trust_first_connection,
        })
    }
}

fn default_port() -> u16 {
    22
}

fn default_trust_first_connection() -> bool {
    true
}

impl ServerConfig {
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("server address cannot be empty".to_string());
        }

        // Parse format: [user@]host[:port]
        let (user_part, rest) = match s.split_once('@') {
            Some((user, rest)) if !user.is_empty() => (Some(user), rest),
            Some(_) => return Err("user cannot be empty".to_string()),
            None => (None, s),
        };

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port_str)) => {
                let port = port_str
                    .parse::<u16>()
                    .map_err(|_| format!("invalid port: {}", port_str))?;
                (host, port)
            }
            None => (rest, default_port()),
        };

        if host.is_empty() {
            return Err("hostname cannot be empty".to_string());
        }

        Ok(ServerConfig {
            host: host.to_string(),
            port,
            user: user_part.map(|s| s.to_string()),
            key: None,
            known_hosts: None,
            runtime: None,
            trust_first_connection: default_trust_first_connection(),
        })
    }

    /// Login user, defaulting to the local `$USER` and then `root`.
    pub fn login_user(&self) -> String {
        self.user
            .clone()
            .unwrap_or_else(|| std::env::var("USER").unwrap_or_else(|_| "root".to_string()))
    }

    pub fn target(&self) -> DeploymentTarget {
        DeploymentTarget {
            host: self.host.clone(),
            port: self.port,
            user: self.login_user(),
            credential: self.key.clone(),
            known_hosts: self.known_hosts.clone(),
            trust_first_connection: self.trust_first_connection,
            runtime: self.runtime,
            current_container: None,
        }
    }
}

impl DeploymentTarget {
    /// SSH settings for reaching this target.
    pub fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::new(&self.host, &self.user)
            .port(self.port)
            .trust_first_connection(self.trust_first_connection);

        if let Some(ref key) = self.credential {
            config = config.key(key.clone());
        }
        if let Some(ref path) = self.known_hosts {
            config = config.known_hosts(path);
        }
        config
    }
}

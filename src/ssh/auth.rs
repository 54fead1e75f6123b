// ABOUTME: Resolves which identity to offer the target and offers it.
// ABOUTME: An explicit key reference wins; otherwise the agent, then the usual ~/.ssh keys.

use russh::client::Handle;
use russh::keys::agent::client::AgentClient;
use russh::keys::{PrivateKeyWithHashAlg, decode_secret_key, load_secret_key, ssh_key};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::UnixStream;

use super::host_keys::HostKeyPolicy;
use super::{Error, Result};

/// Where the private key for a target comes from.
///
/// Only the reference is stored; key material is read at connect time.
///
/// ```yaml
/// key: { path: ~/.ssh/deploy_ed25519 }
/// key: { env: SSH_PRIVATE_KEY }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeySource {
    Path(PathBuf),
    Env(String),
}

impl KeySource {
    fn describe(&self) -> String {
        match self {
            KeySource::Path(path) => path.display().to_string(),
            KeySource::Env(var) => format!("${}", var),
        }
    }

    fn load(&self) -> Result<ssh_key::PrivateKey> {
        let failed = |reason: String| Error::Key {
            origin: self.describe(),
            reason,
        };
        match self {
            KeySource::Path(path) => {
                load_secret_key(expand_home(path), None).map_err(|e| failed(e.to_string()))
            }
            KeySource::Env(var) => {
                let pem = std::env::var(var).map_err(|_| failed("variable not set".to_string()))?;
                decode_secret_key(&pem, None).map_err(|e| failed(e.to_string()))
            }
        }
    }
}

/// `~/` paths as written in hoist.yml.
fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

/// Keys tried when nothing is configured and no agent is running.
fn default_keys(home: &Path) -> [PathBuf; 3] {
    ["id_ed25519", "id_ecdsa", "id_rsa"].map(|name| home.join(".ssh").join(name))
}

/// The identity a session will offer.
pub(super) enum Credential {
    Agent(AgentClient<UnixStream>),
    Key(Arc<ssh_key::PrivateKey>),
}

impl Credential {
    pub(super) async fn resolve(configured: Option<&KeySource>) -> Result<Self> {
        if let Some(source) = configured {
            return Ok(Credential::Key(Arc::new(source.load()?)));
        }

        if let Ok(agent) = AgentClient::connect_env().await {
            return Ok(Credential::Agent(agent));
        }

        let home = std::env::var_os("HOME")
            .ok_or_else(|| Error::NoCredential("no agent and HOME is not set".to_string()))?;
        default_keys(Path::new(&home))
            .iter()
            .find_map(|path| load_secret_key(path, None).ok())
            .map(|key| Credential::Key(Arc::new(key)))
            .ok_or_else(|| Error::NoCredential("no agent and no key in ~/.ssh".to_string()))
    }

    /// Offer this identity as `user`. Returns whether the server accepted it.
    pub(super) async fn offer(self, handle: &mut Handle<HostKeyPolicy>, user: &str) -> Result<bool> {
        match self {
            Credential::Agent(mut agent) => {
                let identities = agent
                    .request_identities()
                    .await
                    .map_err(|e| Error::NoCredential(format!("agent: {}", e)))?;
                if identities.is_empty() {
                    return Err(Error::NoCredential("agent holds no keys".to_string()));
                }

                for identity in identities {
                    let accepted = handle
                        .authenticate_publickey_with(user, identity, None, &mut agent)
                        .await
                        .map(|result| result.success())
                        .unwrap_or(false);
                    if accepted {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Credential::Key(key) => {
                let hash_alg = handle.best_supported_rsa_hash().await?.flatten();
                let result = handle
                    .authenticate_publickey(user, PrivateKeyWithHashAlg::new(key, hash_alg))
                    .await?;
                Ok(result.success())
            }
        }
    }
}

// ABOUTME: Server key verification against known_hosts for a single deployment target.
// ABOUTME: Unknown hosts are rejected unless the target opts into trusting its first connection.

use russh::client;
use russh::keys::known_hosts::{
    check_known_hosts, check_known_hosts_path, learn_known_hosts, learn_known_hosts_path,
};
use russh::keys::ssh_key::PublicKey;
use std::path::PathBuf;

/// What known_hosts says about a presented key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recorded {
    Matches,
    Unknown,
    Changed,
}

/// Handler installed on every connection; decides whether the server key is acceptable.
pub struct HostKeyPolicy {
    host: String,
    port: u16,
    known_hosts: Option<PathBuf>,
    trust_first_connection: bool,
}

impl HostKeyPolicy {
    pub(super) fn new(
        host: &str,
        port: u16,
        known_hosts: Option<PathBuf>,
        trust_first_connection: bool,
    ) -> Self {
        Self {
            host: host.to_string(),
            port,
            known_hosts,
            trust_first_connection,
        }
    }

    fn lookup(&self, key: &PublicKey) -> Recorded {
        let result = match &self.known_hosts {
            Some(path) => check_known_hosts_path(&self.host, self.port, key, path),
            None => check_known_hosts(&self.host, self.port, key),
        };
        match result {
            Ok(true) => Recorded::Matches,
            Ok(false) => Recorded::Unknown,
            Err(russh::keys::Error::KeyChanged { .. }) => Recorded::Changed,
            // An unreadable or missing known_hosts file means nothing is recorded.
            Err(_) => Recorded::Unknown,
        }
    }

    fn remember(&self, key: &PublicKey) {
        let learned = match &self.known_hosts {
            Some(path) => learn_known_hosts_path(&self.host, self.port, key, path),
            None => learn_known_hosts(&self.host, self.port, key),
        };
        if let Err(e) = learned {
            tracing::warn!(host = %self.host, "could not record host key: {}", e);
        }
    }

    fn decide(&self, recorded: Recorded) -> bool {
        match recorded {
            Recorded::Matches => true,
            Recorded::Changed => false,
            Recorded::Unknown => self.trust_first_connection,
        }
    }
}

impl client::Handler for HostKeyPolicy {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        let recorded = self.lookup(server_public_key);
        let accept = self.decide(recorded);

        match (recorded, accept) {
            (Recorded::Changed, _) => {
                tracing::error!(host = %self.host, port = self.port, "host key changed; refusing connection");
            }
            (Recorded::Unknown, true) => {
                tracing::info!(host = %self.host, port = self.port, "trusting host key on first connection");
                self.remember(server_public_key);
            }
            (Recorded::Unknown, false) => {
                tracing::warn!(host = %self.host, port = self.port, "host key not in known_hosts");
            }
            (Recorded::Matches, _) => {}
        }
        Ok(accept)
    }
}

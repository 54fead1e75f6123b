// ABOUTME: Registry client driving the local container CLI (login, manifest inspect, push).
// ABOUTME: The password goes through stdin; it is never part of argv.

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use super::{Credentials, PublishError, Registry};
use crate::local;
use crate::types::{Digest, ImageRef};

#[derive(Debug, Clone)]
pub struct CliRegistry {
    binary: String,
}

impl CliRegistry {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(
        &self,
        subject: &str,
        args: &[&str],
        stdin: Option<&str>,
    ) -> Result<String, PublishError> {
        let mut command = Command::new(&self.binary);
        command.args(args);
        tracing::debug!("{} {}", self.binary, args.join(" "));

        let output = local::run(command, stdin)
            .await
            .map_err(|e| PublishError::Transport(format!("running {}: {}", self.binary, e)))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(PublishError::from_cli(
                subject,
                &local::tail(&output.stderr, 10),
            ))
        }
    }
}

#[async_trait]
impl Registry for CliRegistry {
    async fn login(&self, credentials: &Credentials) -> Result<(), PublishError> {
        let mut args = vec![
            "login",
            "--username",
            credentials.username.as_str(),
            "--password-stdin",
        ];
        if let Some(ref server) = credentials.server {
            args.push(server.as_str());
        }
        let subject = credentials.server.as_deref().unwrap_or("default registry");
        self.run(subject, &args, Some(&credentials.password))
            .await
            .map(|_| ())
    }

    async fn remote_digest(&self, image: &ImageRef) -> Result<Option<Digest>, PublishError> {
        let reference = image.to_string();
        match self
            .run(&reference, &["manifest", "inspect", "-v", &reference], None)
            .await
        {
            Ok(stdout) => Ok(config_digest(&stdout)),
            Err(PublishError::Transport(message)) if is_not_found(&message) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn push(&self, image: &ImageRef) -> Result<(), PublishError> {
        let reference = image.to_string();
        self.run(&reference, &["push", &reference], None).await.map(|_| ())
    }
}

fn is_not_found(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("no such manifest") || lower.contains("manifest unknown") || lower.contains("not found")
}

/// Config digest from `manifest inspect -v` output.
///
/// The local image ID is the config digest, so that is what gets compared.
/// For a manifest list the first entry is used.
fn config_digest(stdout: &str) -> Option<Digest> {
    let value: Value = serde_json::from_str(stdout).ok()?;
    let entry = match value {
        Value::Array(entries) => entries.into_iter().next()?,
        other => other,
    };

    ["SchemaV2Manifest", "OCIManifest"]
        .iter()
        .find_map(|key| entry.get(key)?.get("config")?.get("digest")?.as_str())
        .and_then(|digest| Digest::parse(digest).ok())
}

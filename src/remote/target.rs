// ABOUTME: The host a pipeline run deploys to.
// ABOUTME: Holds a credential reference, never key material.

use crate::ssh::KeySource;
use crate::types::ContainerId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The container CLI available on the target host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeType {
    Docker,
    Podman,
}

impl RuntimeType {
    pub fn binary(&self) -> &'static str {
        match self {
            RuntimeType::Docker => "docker",
            RuntimeType::Podman => "podman",
        }
    }
}

impl std::fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.binary())
    }
}

#[derive(Debug, Clone)]
pub struct DeploymentTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub credential: Option<KeySource>,
    pub known_hosts: Option<PathBuf>,
    pub trust_first_connection: bool,
    pub runtime: Option<RuntimeType>,
    /// The container currently serving, as last observed by the executor.
    pub current_container: Option<ContainerId>,
}

impl DeploymentTarget {
    /// Identity used to serialize runs against the same host.
    pub fn lock_key(&self) -> String {
        format!("{}:{}", self.host.to_lowercase(), self.port)
    }
}

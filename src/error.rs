// ABOUTME: Application-wide error types for hoist.
// ABOUTME: Uses thiserror; component errors convert in with #[from].

use std::path::PathBuf;
use thiserror::Error;

use crate::ssh;
use crate::startup::StartupError;
use crate::types::RevisionError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("hoist.yml not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("unknown destination: {0}")]
    UnknownDestination(String),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no revision given; pass --revision or set GITHUB_SHA")]
    MissingRevision,

    #[error("invalid revision: {0}")]
    InvalidRevision(#[from] RevisionError),

    #[error("deployment failed: {0}")]
    DeployFailed(String),

    #[error(transparent)]
    Startup(#[from] StartupError),

    #[error("SSH error: {0}")]
    Ssh(#[from] ssh::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Startup(e) => e.exit_code().code(),
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// ABOUTME: Artifact builder: turns a source revision into an immutable, digest-addressed image.
// ABOUTME: Builds are never retried; a failed build ends the run.

mod cli;
mod scripts;
mod spec;

pub use cli::CliBuilder;
pub use scripts::normalize_script;
pub use spec::{Artifact, BuildSpec};

use crate::types::DigestError;
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to normalize script {path}: {source}")]
    ScriptNormalization {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to run {binary}: {source}")]
    Spawn {
        binary: String,
        source: std::io::Error,
    },

    #[error("image build failed ({status}):\n{stderr_tail}")]
    BuildFailed { status: String, stderr_tail: String },

    #[error("image inspect failed ({status}): {stderr_tail}")]
    InspectFailed { status: String, stderr_tail: String },

    #[error("image inspect returned an invalid digest: {0}")]
    InvalidDigest(#[from] DigestError),
}

#[async_trait]
pub trait Builder: Send + Sync {
    async fn build(&self, spec: &BuildSpec) -> Result<Artifact, BuildError>;
}

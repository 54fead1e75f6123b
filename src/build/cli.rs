// ABOUTME: Builds images with the local container CLI.
// ABOUTME: Build-arg values travel through the child environment, never argv.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;

use super::{Artifact, BuildError, BuildSpec, Builder, normalize_script};
use crate::config::BuildConfig;
use crate::local;
use crate::types::Digest;

pub const REVISION_LABEL: &str = "org.opencontainers.image.revision";
pub const FINGERPRINT_LABEL: &str = "hoist.fingerprint";

#[derive(Debug, Clone)]
pub struct CliBuilder {
    binary: String,
    context: PathBuf,
    dockerfile: PathBuf,
    scripts: Vec<PathBuf>,
}

impl CliBuilder {
    pub fn new(binary: impl Into<String>, context: impl Into<PathBuf>) -> Self {
        let context = context.into();
        Self {
            binary: binary.into(),
            dockerfile: context.join("Dockerfile"),
            context,
            scripts: Vec::new(),
        }
    }

    pub fn from_config(config: &BuildConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            context: config.context.clone(),
            dockerfile: config.dockerfile_path(),
            scripts: config.script_paths(),
        }
    }

    pub fn dockerfile(mut self, path: impl Into<PathBuf>) -> Self {
        self.dockerfile = path.into();
        self
    }

    pub fn script(mut self, path: impl Into<PathBuf>) -> Self {
        self.scripts.push(path.into());
        self
    }

    fn normalize_scripts(&self) -> Result<(), BuildError> {
        for path in &self.scripts {
            let changed = normalize_script(path).map_err(|source| {
                BuildError::ScriptNormalization {
                    path: path.clone(),
                    source,
                }
            })?;
            if changed {
                tracing::info!("normalized {}", path.display());
            }
        }
        Ok(())
    }

    /// Arguments for `build`. Only names of build args appear here.
    pub(crate) fn build_args(&self, spec: &BuildSpec) -> Vec<String> {
        let mut args = vec![
            "build".to_string(),
            "--file".to_string(),
            self.dockerfile.display().to_string(),
            "--tag".to_string(),
            spec.image().to_string(),
            "--label".to_string(),
            format!("{}={}", REVISION_LABEL, spec.revision()),
            "--label".to_string(),
            format!("{}={}", FINGERPRINT_LABEL, spec.fingerprint()),
        ];
        for (name, _) in spec.args() {
            args.push("--build-arg".to_string());
            args.push(name.to_string());
        }
        args.push(self.context.display().to_string());
        args
    }

    async fn run(&self, args: &[String], spec: Option<&BuildSpec>) -> Result<std::process::Output, BuildError> {
        let mut command = Command::new(&self.binary);
        command.args(args);
        if let Some(spec) = spec {
            command.envs(spec.args());
        }
        tracing::debug!("{} {}", self.binary, args.join(" "));

        local::run(command, None)
            .await
            .map_err(|source| BuildError::Spawn {
                binary: self.binary.clone(),
                source,
            })
    }
}

#[async_trait]
impl Builder for CliBuilder {
    async fn build(&self, spec: &BuildSpec) -> Result<Artifact, BuildError> {
        self.normalize_scripts()?;

        tracing::info!("building {} at {}", spec.image(), spec.revision());
        let output = self.run(&self.build_args(spec), Some(spec)).await?;
        if !output.status.success() {
            return Err(BuildError::BuildFailed {
                status: output.status.to_string(),
                stderr_tail: local::tail(&output.stderr, 20),
            });
        }

        let inspect = [
            "image".to_string(),
            "inspect".to_string(),
            "--format".to_string(),
            "{{.Id}}".to_string(),
            spec.image().to_string(),
        ];
        let output = self.run(&inspect, None).await?;
        if !output.status.success() {
            return Err(BuildError::InspectFailed {
                status: output.status.to_string(),
                stderr_tail: local::tail(&output.stderr, 5),
            });
        }

        let digest = Digest::parse(String::from_utf8_lossy(&output.stdout).trim())?;
        tracing::info!("built {} ({})", spec.image(), digest);

        Ok(Artifact {
            image: spec.image().clone(),
            digest,
            fingerprint: spec.fingerprint(),
        })
    }
}

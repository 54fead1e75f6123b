// ABOUTME: Ordered remote transition: stop old, pull new, start new.
// ABOUTME: The first failing sub-step aborts the rest and reports what state the old container is in.

use chrono::{DateTime, Utc};
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use std::time::Duration;

use super::commands::parse_ids;
use super::{ContainerCli, DeploymentTarget, RemoteCommand, RemoteShell, RunSpec, RuntimeType};
use super::detect_runtime;
use crate::config::{RestartPolicy, RuntimeEnv};
use crate::publish::{Credentials, PublishedRef};
use crate::ssh::{self, CommandOutput};
use crate::step::{StepOutcome, TransitionStep};
use crate::types::{ContainerId, Revision, ServiceName};

/// Why a remote sub-step failed.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ExecutionError {
    #[snafu(display("no container runtime found on host (checked docker and podman)"))]
    NoRuntime,

    #[snafu(display("transport failed during {step}: {source}"))]
    Transport {
        step: TransitionStep,
        source: ssh::Error,
    },

    #[snafu(display("{step} command failed ({detail})"))]
    Command { step: TransitionStep, detail: String },

    #[snafu(display("runtime variable {name} contains a line break and cannot be passed"))]
    InvalidEnvValue { name: String },

    #[snafu(display("container runtime did not print a container id: {output:?}"))]
    MissingContainerId { output: String },
}

/// What the previously serving container is doing after a transition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OldContainerState {
    /// Nothing was running for the service (first deployment).
    NotPresent,
    /// StopOld did not complete; the old container may still serve.
    StillRunning,
    /// StopOld completed; the service is down until a new container serves.
    Stopped,
}

#[derive(Debug)]
pub struct ExecutionFailure {
    pub step: TransitionStep,
    pub error: ExecutionError,
    pub old_state: OldContainerState,
}

#[derive(Debug)]
pub struct ExecutionResult {
    pub runtime: Option<RuntimeType>,
    pub steps: Vec<StepOutcome>,
    /// Containers stopped by StopOld, kept until the new one is confirmed.
    pub stopped: Vec<ContainerId>,
    pub new_container: Option<ContainerId>,
    pub old_state: OldContainerState,
    pub failure: Option<ExecutionFailure>,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Per-run settings for the remote transition.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub service: ServiceName,
    pub revision: Revision,
    pub restart: RestartPolicy,
    pub stop_timeout: Duration,
    /// Logged in on the host before pulling, when the registry is private.
    pub registry: Option<Credentials>,
    pub env: RuntimeEnv,
}

#[derive(Debug, Clone)]
pub struct RemoteExecutor {
    settings: ExecutorSettings,
}

impl RemoteExecutor {
    pub fn new(settings: ExecutorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Name for a container started at `at`.
    ///
    /// Unique per start, so redeploying a revision never collides with the
    /// container StopOld just stopped.
    pub fn container_name(&self, at: DateTime<Utc>) -> String {
        format!(
            "{}-{}-{}",
            self.settings.service,
            self.settings.revision.short(),
            at.format("%Y%m%d%H%M%S%3f")
        )
    }

    /// Run StopOld, PullNew, StartNew in order over `shell`.
    ///
    /// `target.current_container` is cleared once the old container is stopped
    /// and set once the new one is started.
    pub async fn apply<S: RemoteShell>(
        &self,
        shell: &S,
        target: &mut DeploymentTarget,
        published: &PublishedRef,
        port: u16,
    ) -> ExecutionResult {
        let mut result = ExecutionResult {
            runtime: None,
            steps: Vec::new(),
            stopped: Vec::new(),
            new_container: None,
            old_state: OldContainerState::StillRunning,
            failure: None,
        };

        let cli = match detect_runtime(shell, target.runtime).await {
            Ok(Some(runtime)) => ContainerCli::new(runtime),
            Ok(None) => {
                fail(&mut result, TransitionStep::StopOld, ExecutionError::NoRuntime);
                return result;
            }
            Err(source) => {
                let error = ExecutionError::Transport {
                    step: TransitionStep::StopOld,
                    source,
                };
                fail(&mut result, TransitionStep::StopOld, error);
                return result;
            }
        };
        result.runtime = Some(cli.runtime());

        // StopOld
        match self.stop_old(shell, &cli, port).await {
            Ok(stopped) if stopped.is_empty() => {
                result.old_state = OldContainerState::NotPresent;
                result.steps.push(StepOutcome::succeeded(
                    TransitionStep::StopOld,
                    "no running container",
                ));
            }
            Ok(stopped) => {
                tracing::info!("stopped {} container(s) on {}", stopped.len(), target.host);
                result.old_state = OldContainerState::Stopped;
                result.steps.push(StepOutcome::succeeded(
                    TransitionStep::StopOld,
                    format!("stopped {}", describe(&stopped)),
                ));
                result.stopped = stopped;
            }
            Err(error) => {
                fail(&mut result, TransitionStep::StopOld, error);
                return result;
            }
        }
        target.current_container = None;

        // PullNew
        if let Err(error) = self.pull_new(shell, &cli, published).await {
            fail(&mut result, TransitionStep::PullNew, error);
            return result;
        }
        result.steps.push(StepOutcome::succeeded(
            TransitionStep::PullNew,
            format!("pulled {}", published.image),
        ));

        // StartNew
        match self.start_new(shell, &cli, published, port).await {
            Ok(id) => {
                tracing::info!("started container {} on {}", id.short(), target.host);
                result.steps.push(StepOutcome::succeeded(
                    TransitionStep::StartNew,
                    format!("started {} on port {}", id.short(), port),
                ));
                target.current_container = Some(id.clone());
                result.new_container = Some(id);
            }
            Err(error) => fail(&mut result, TransitionStep::StartNew, error),
        }

        result
    }

    async fn stop_old<S: RemoteShell>(
        &self,
        shell: &S,
        cli: &ContainerCli,
        port: u16,
    ) -> Result<Vec<ContainerId>, ExecutionError> {
        let step = TransitionStep::StopOld;
        let listed = run(shell, step, &cli.list_running(&self.settings.service, port)).await?;
        let running = parse_ids(&listed.stdout);
        if running.is_empty() {
            return Ok(running);
        }

        run(shell, step, &cli.stop(&running, self.settings.stop_timeout)).await?;
        Ok(running)
    }

    async fn pull_new<S: RemoteShell>(
        &self,
        shell: &S,
        cli: &ContainerCli,
        published: &PublishedRef,
    ) -> Result<(), ExecutionError> {
        let step = TransitionStep::PullNew;
        if let Some(ref credentials) = self.settings.registry {
            run(shell, step, &cli.login(credentials)).await?;
        }
        run(shell, step, &cli.pull(&published.image)).await?;
        Ok(())
    }

    async fn start_new<S: RemoteShell>(
        &self,
        shell: &S,
        cli: &ContainerCli,
        published: &PublishedRef,
        port: u16,
    ) -> Result<ContainerId, ExecutionError> {
        let step = TransitionStep::StartNew;
        let env = &self.settings.env;
        let spec = RunSpec {
            service: &self.settings.service,
            name: self.container_name(Utc::now()),
            image: &published.image,
            revision: self.settings.revision.as_str(),
            digest: published.digest.as_str(),
            restart: &self.settings.restart,
            host_port: port,
            container_port: env.app_port().unwrap_or(port),
            env,
        };
        let command = cli
            .run(&spec)
            .map_err(|name| ExecutionError::InvalidEnvValue { name })?;

        let output = run(shell, step, &command).await?;
        let id = output
            .stdout
            .lines()
            .map(str::trim)
            .rfind(|line| !line.is_empty())
            .context(MissingContainerIdSnafu {
                output: output.stdout.clone(),
            })?;
        Ok(ContainerId::new(id.to_string()))
    }

    /// Remove containers stopped by a transition whose replacement is confirmed.
    pub async fn remove_stopped<S: RemoteShell>(
        &self,
        shell: &S,
        runtime: RuntimeType,
        stopped: &[ContainerId],
        keep: Option<&ContainerId>,
    ) -> Result<(), ExecutionError> {
        let doomed: Vec<ContainerId> = stopped
            .iter()
            .filter(|id| Some(*id) != keep)
            .cloned()
            .collect();
        if doomed.is_empty() {
            return Ok(());
        }
        let cli = ContainerCli::new(runtime);
        run(shell, TransitionStep::StartNew, &cli.remove(&doomed)).await?;
        Ok(())
    }
}

/// Execute and require exit code 0.
pub(crate) async fn run<S: RemoteShell>(
    shell: &S,
    step: TransitionStep,
    command: &RemoteCommand,
) -> Result<CommandOutput, ExecutionError> {
    let output = shell.exec(command).await.context(TransportSnafu { step })?;
    ensure!(
        output.success(),
        CommandSnafu {
            step,
            detail: output.diagnostic()
        }
    );
    Ok(output)
}

fn fail(result: &mut ExecutionResult, step: TransitionStep, error: ExecutionError) {
    tracing::warn!("{} failed: {}", step, error);
    result
        .steps
        .push(StepOutcome::failed(step, error.to_string()));
    result.failure = Some(ExecutionFailure {
        step,
        error,
        old_state: result.old_state,
    });
}

fn describe(ids: &[ContainerId]) -> String {
    ids.iter()
        .map(|id| id.short().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

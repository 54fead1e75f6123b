// ABOUTME: The pipeline as a type-state machine: Idle, Building, Publishing, Deploying, then a terminal state.
// ABOUTME: Each transition consumes the pipeline; every failure path ends in Pipeline<Failed>.

use chrono::Utc;
use std::time::Duration;

use super::state::{Building, Deploying, Failed, Idle, PipelineState, Publishing, Succeeded};
use super::{DeployError, DeployLock, FailureRecord, PipelineRun, PipelineStatus, Stage};
use crate::build::{Artifact, BuildSpec, Builder};
use crate::config::RetryPolicy;
use crate::diagnostics::{Diagnostics, WarningKind};
use crate::publish::{PublishedRef, Publisher, Registry};
use crate::remote::{
    Connector, ContainerCli, DeploymentTarget, ExecutorSettings, RemoteExecutor, RemoteShell,
    observe_startup,
};
use crate::step::{StepOutcome, TransitionStep};
use crate::types::Revision;

/// A transition either advances the pipeline or fails it.
pub type Transition<T> = Result<Pipeline<T>, Pipeline<Failed>>;

/// Everything the deploying stage needs besides the published image.
#[derive(Debug, Clone)]
pub struct DeploySettings {
    pub target: DeploymentTarget,
    pub executor: ExecutorSettings,
    /// Host port the container is published on.
    pub port: u16,
    pub startup_timeout: Duration,
    pub startup_interval: Duration,
    /// Break a live remote lock held by someone else.
    pub force: bool,
}

/// One pipeline run, parameterized by its current state.
///
/// ```
/// use hoist::deploy::{Pipeline, PipelineStatus};
/// use hoist::types::Revision;
///
/// let pipeline = Pipeline::new(Revision::new("abc123").unwrap(), "web1:22").start();
/// assert_eq!(pipeline.status(), PipelineStatus::Building);
/// ```
///
/// A run can only be finished from a terminal state:
///
/// ```compile_fail
/// use hoist::deploy::Pipeline;
/// use hoist::types::Revision;
///
/// let building = Pipeline::new(Revision::new("abc123").unwrap(), "web1:22").start();
/// let run = building.finish();
/// ```
#[derive(Debug)]
pub struct Pipeline<S> {
    pub(crate) run: PipelineRun,
    pub(crate) state: S,
}

impl Pipeline<Idle> {
    pub fn new(revision: Revision, target: impl Into<String>) -> Self {
        Pipeline {
            run: PipelineRun::new(revision, target),
            state: Idle,
        }
    }

    pub fn start(self) -> Pipeline<Building> {
        self.advance(Building)
    }
}

impl<S: PipelineState> Pipeline<S> {
    pub fn record(&self) -> &PipelineRun {
        &self.run
    }

    pub fn status(&self) -> PipelineStatus {
        S::STATUS
    }

    fn advance<T: PipelineState>(mut self, state: T) -> Pipeline<T> {
        tracing::info!("pipeline {}: {} -> {}", self.run.id, S::STATUS, T::STATUS);
        self.run.status = T::STATUS;
        Pipeline {
            run: self.run,
            state,
        }
    }

    fn fail(mut self, failure: FailureRecord) -> Pipeline<Failed> {
        tracing::error!(
            "pipeline {} failed while {}: {}",
            self.run.id,
            failure.stage,
            failure.message
        );
        self.run.failure = Some(failure);
        self.advance(Failed)
    }
}

impl Pipeline<Building> {
    /// Build the image. Build failures are final.
    pub async fn build<B: Builder + ?Sized>(mut self, builder: &B, spec: &BuildSpec) -> Transition<Publishing> {
        self.run.fingerprint = Some(spec.fingerprint());
        match builder.build(spec).await {
            Ok(artifact) => {
                self.run.artifact = Some(artifact.clone());
                Ok(self.advance(Publishing { artifact }))
            }
            Err(e) => Err(self.fail(FailureRecord {
                stage: Stage::Building,
                step: None,
                blocked_by: None,
                message: e.to_string(),
                old_container: None,
            })),
        }
    }
}

impl Pipeline<Publishing> {
    pub fn artifact(&self) -> &Artifact {
        &self.state.artifact
    }

    /// Publish, retrying retryable errors with backoff until `retry` is exhausted.
    pub async fn publish<R: Registry>(mut self, publisher: &Publisher<R>, retry: &RetryPolicy) -> Transition<Deploying> {
        let attempts = retry.attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.run.publish_attempts = attempt;

            match publisher.publish(&self.state.artifact).await {
                Ok(published) => {
                    self.run.published = Some(published.clone());
                    return Ok(self.advance(Deploying { published }));
                }
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let delay = retry.delay_after(attempt);
                    tracing::warn!(
                        "publish attempt {}/{} failed: {}; retrying in {:?}",
                        attempt,
                        attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    let message = if e.is_retryable() {
                        format!("{} (after {} attempts)", e, attempt)
                    } else {
                        e.to_string()
                    };
                    return Err(self.fail(FailureRecord {
                        stage: Stage::Publishing,
                        step: None,
                        blocked_by: None,
                        message,
                        old_container: None,
                    }));
                }
            }
        }
    }
}

/// Result of the host transition, before it is folded into the run.
struct HostOutcome {
    steps: Vec<StepOutcome>,
    failure: Option<FailureRecord>,
    new_container: Option<crate::types::ContainerId>,
}

impl HostOutcome {
    fn failed(steps: Vec<StepOutcome>, failure: FailureRecord) -> Self {
        Self {
            steps,
            failure: Some(failure),
            new_container: None,
        }
    }
}

impl Pipeline<Deploying> {
    pub fn published(&self) -> &PublishedRef {
        &self.state.published
    }

    /// Transition the target host and watch the new container start.
    ///
    /// The caller holds the per-target lock. The session is closed on every
    /// path; a failed close is a warning, not a failure.
    pub async fn deploy<C: Connector>(
        mut self,
        connector: &C,
        settings: &DeploySettings,
    ) -> Transition<Succeeded> {
        let mut diagnostics = Diagnostics::default();

        let outcome = match connector.connect(&settings.target).await {
            Ok(shell) => {
                let outcome = self.transition_host(&shell, settings, &mut diagnostics).await;
                if let Err(e) = shell.close().await {
                    diagnostics.record(
                        WarningKind::SessionClose,
                        format!("{}: {}", settings.target.host, e),
                    );
                }
                outcome
            }
            Err(source) => {
                let error = DeployError::Connect {
                    target: settings.target.lock_key(),
                    source,
                };
                HostOutcome::failed(
                    skipped_from(TransitionStep::StopOld, "not connected"),
                    FailureRecord {
                        stage: Stage::Deploying,
                        step: None,
                        blocked_by: None,
                        message: error.to_string(),
                        old_container: None,
                    },
                )
            }
        };

        self.run.warnings.extend(diagnostics.into_warnings());
        self.run.steps = outcome.steps;
        self.run.new_container = outcome.new_container;

        match outcome.failure {
            None => Ok(self.advance(Succeeded)),
            Some(failure) => Err(self.fail(failure)),
        }
    }

    async fn transition_host<S: RemoteShell>(
        &self,
        shell: &S,
        settings: &DeploySettings,
        diagnostics: &mut Diagnostics,
    ) -> HostOutcome {
        let service = &settings.executor.service;
        let revision = settings.executor.revision.as_str();

        let lock = match DeployLock::acquire(shell, service, Some(revision), settings.force).await {
            Ok(lock) => lock,
            Err(e) => {
                return HostOutcome::failed(
                    skipped_from(TransitionStep::StopOld, "deploy lock not acquired"),
                    FailureRecord {
                        stage: Stage::Deploying,
                        step: None,
                        blocked_by: None,
                        message: e.to_string(),
                        old_container: None,
                    },
                );
            }
        };

        let outcome = self.apply_and_observe(shell, settings, diagnostics).await;

        if let Err(e) = lock.release().await {
            diagnostics.record(WarningKind::LockRelease, e.to_string());
        }
        outcome
    }

    async fn apply_and_observe<S: RemoteShell>(
        &self,
        shell: &S,
        settings: &DeploySettings,
        diagnostics: &mut Diagnostics,
    ) -> HostOutcome {
        let executor = RemoteExecutor::new(settings.executor.clone());
        let mut target = settings.target.clone();
        let published = &self.state.published;

        let result = executor.apply(shell, &mut target, published, settings.port).await;
        let mut steps = result.steps;

        if let Some(failure) = result.failure {
            steps.extend(skipped_after(failure.step));
            return HostOutcome::failed(
                steps,
                FailureRecord {
                    stage: Stage::Deploying,
                    step: Some(failure.step),
                    blocked_by: None,
                    message: failure.error.to_string(),
                    old_container: Some(failure.old_state),
                },
            );
        }

        let (Some(runtime), Some(container)) = (result.runtime, result.new_container) else {
            steps.extend(skipped_after(TransitionStep::StartNew));
            return HostOutcome::failed(
                steps,
                FailureRecord {
                    stage: Stage::Deploying,
                    step: Some(TransitionStep::StartNew),
                    blocked_by: None,
                    message: "new container was not reported".to_string(),
                    old_container: Some(result.old_state),
                },
            );
        };

        let cli = ContainerCli::new(runtime);
        let observation = observe_startup(
            shell,
            &cli,
            &container,
            settings.startup_timeout,
            settings.startup_interval,
        )
        .await;
        steps.extend(observation.steps);

        if let Some(failure) = observation.failure {
            return HostOutcome {
                steps,
                failure: Some(FailureRecord {
                    stage: Stage::Deploying,
                    step: Some(failure.step),
                    blocked_by: failure.blocked_by,
                    message: failure.message,
                    old_container: Some(result.old_state),
                }),
                new_container: Some(container),
            };
        }

        // The replacement is confirmed; the stopped containers can go.
        if let Err(e) = executor
            .remove_stopped(shell, runtime, &result.stopped, Some(&container))
            .await
        {
            diagnostics.record(WarningKind::Cleanup, e.to_string());
        }

        HostOutcome {
            steps,
            failure: None,
            new_container: Some(container),
        }
    }
}

impl Pipeline<Succeeded> {
    pub fn finish(self) -> PipelineRun {
        finish(self.run)
    }
}

impl Pipeline<Failed> {
    pub fn failure(&self) -> Option<&FailureRecord> {
        self.run.failure.as_ref()
    }

    pub fn finish(self) -> PipelineRun {
        finish(self.run)
    }
}

fn finish(mut run: PipelineRun) -> PipelineRun {
    run.finished_at = Some(Utc::now());
    run
}

/// Outcomes for `step` and everything after it, all skipped.
fn skipped_from(step: TransitionStep, reason: &str) -> Vec<StepOutcome> {
    TransitionStep::ALL
        .into_iter()
        .filter(|s| *s >= step)
        .map(|s| StepOutcome::skipped(s, reason))
        .collect()
}

/// Outcomes for every step after `failed`, skipped because of it.
fn skipped_after(failed: TransitionStep) -> Vec<StepOutcome> {
    TransitionStep::ALL
        .into_iter()
        .filter(|s| *s > failed)
        .map(|s| StepOutcome::skipped(s, format!("blocked by {}", failed)))
        .collect()
}

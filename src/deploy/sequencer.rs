// ABOUTME: Runs one pipeline end to end: build, publish with retry, transition the host.
// ABOUTME: Shared across concurrent runs; only the per-target lock registry is common state.

use std::sync::Arc;

use super::{DeploySettings, Pipeline, PipelineRun, TargetLocks};
use crate::build::{BuildSpec, Builder};
use crate::config::{Config, RetryPolicy, RuntimeEnv, resolve_env_map};
use crate::error::Result;
use crate::publish::{Credentials, Publisher, Registry};
use crate::remote::{Connector, ExecutorSettings};
use crate::types::{ImageRef, Revision};

/// Inputs of one triggered run.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub revision: Revision,
    pub image: ImageRef,
    /// Runtime variables plus extra build args, passed to the build.
    pub build_args: RuntimeEnv,
    pub credentials: Option<Credentials>,
    pub retry: RetryPolicy,
    pub deploy: DeploySettings,
}

impl DeployRequest {
    /// Resolve every referenced value in `config` for a run of `revision`.
    pub fn from_config(config: &Config, revision: Revision, force: bool) -> Result<Self> {
        let image = config.image_ref();
        let env = config.runtime_env()?;

        let mut build_args = env.clone();
        for (name, value) in resolve_env_map(&config.build.args)? {
            build_args.insert(name, value);
        }

        let credentials = config
            .registry
            .as_ref()
            .map(|r| r.credentials(image.registry()))
            .transpose()?;

        let executor = ExecutorSettings {
            service: config.service.clone(),
            revision: revision.clone(),
            restart: config.restart.clone(),
            stop_timeout: config.stop.timeout,
            registry: credentials.clone(),
            env,
        };

        Ok(Self {
            revision,
            image,
            build_args,
            credentials,
            retry: config.publish_retry.clone(),
            deploy: DeploySettings {
                target: config.server.target(),
                executor,
                port: config.port,
                startup_timeout: config.startup_check.timeout,
                startup_interval: config.startup_check.interval,
                force,
            },
        })
    }
}

/// Drives pipeline runs. Wrap in `Arc` to run against several targets at once.
pub struct Sequencer<B, R, C> {
    builder: B,
    registry: Arc<R>,
    connector: C,
    locks: TargetLocks,
}

impl<B, R, C> Sequencer<B, R, C>
where
    B: Builder,
    R: Registry,
    C: Connector,
{
    pub fn new(builder: B, registry: R, connector: C) -> Self {
        Self {
            builder,
            registry: Arc::new(registry),
            connector,
            locks: TargetLocks::new(),
        }
    }

    pub fn builder(&self) -> &B {
        &self.builder
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Run the whole pipeline. Always returns a terminal record.
    ///
    /// Runs against one target are serialized from build to the end of
    /// deploy. No other run pushes the tag between this run's publish and
    /// its pull.
    pub async fn run(&self, request: &DeployRequest) -> PipelineRun {
        let _target = self.locks.acquire(&request.deploy.target.lock_key()).await;
        let pipeline = Pipeline::new(request.revision.clone(), request.deploy.target.lock_key()).start();

        let spec = BuildSpec::new(
            request.revision.clone(),
            request.image.clone(),
            &request.build_args,
        );
        let publishing = match pipeline.build(&self.builder, &spec).await {
            Ok(next) => next,
            Err(failed) => return failed.finish(),
        };

        // A fresh publisher per run: login happens at most once per run.
        let publisher = Publisher::new(Arc::clone(&self.registry), request.credentials.clone());
        let deploying = match publishing.publish(&publisher, &request.retry).await {
            Ok(next) => next,
            Err(failed) => return failed.finish(),
        };

        match deploying
            .deploy(&self.connector, &request.deploy)
            .await
        {
            Ok(succeeded) => succeeded.finish(),
            Err(failed) => failed.finish(),
        }
    }
}

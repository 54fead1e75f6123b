// ABOUTME: Remote side of a deployment: stop old, pull new, start new.
// ABOUTME: Everything runs as container CLI commands over one authenticated shell.

mod commands;
mod detection;
mod executor;
mod observe;
mod shell;
mod target;

pub use commands::{ContainerCli, RunSpec};
pub use detection::detect_runtime;
pub use executor::{
    ExecutionError, ExecutionFailure, ExecutionResult, ExecutorSettings, OldContainerState,
    RemoteExecutor,
};
pub use observe::{StartupFailure, StartupObservation, observe_startup};
pub use shell::{Connector, RemoteCommand, RemoteShell, quote};
pub use target::{DeploymentTarget, RuntimeType};

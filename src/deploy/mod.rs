// ABOUTME: Deployment sequencing using the type state pattern.
// ABOUTME: Exports state markers, the Pipeline, its run record, locks, and the Sequencer.

mod error;
mod lock;
mod pipeline;
mod run;
mod sequencer;
mod state;

pub use error::DeployError;
pub use lock::{DeployLock, LockInfo, TargetLocks};
pub use pipeline::{DeploySettings, Pipeline, Transition};
pub use run::{FailureRecord, PipelineRun, Stage};
pub use sequencer::{DeployRequest, Sequencer};
pub use state::{
    Building, Deploying, Failed, Idle, PipelineState, PipelineStatus, Publishing, Succeeded,
};

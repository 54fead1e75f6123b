// ABOUTME: Pipeline state markers for the type state pattern.
// ABOUTME: Each marker carries the data that exists once the pipeline reaches it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::build::Artifact;
use crate::publish::PublishedRef;

/// Runtime mirror of the type-level states, stored in the run record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Idle,
    Building,
    Publishing,
    Deploying,
    Succeeded,
    Failed,
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineStatus::Idle => "idle",
            PipelineStatus::Building => "building",
            PipelineStatus::Publishing => "publishing",
            PipelineStatus::Deploying => "deploying",
            PipelineStatus::Succeeded => "succeeded",
            PipelineStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Implemented by the state markers only.
pub trait PipelineState: sealed::Sealed {
    const STATUS: PipelineStatus;
}

/// Created, nothing done yet.
/// Available actions: `start()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Idle;

/// Building the image.
/// Available actions: `build()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Building;

/// Image built; pushing it.
/// Available actions: `publish()`
#[derive(Debug, Clone)]
pub struct Publishing {
    pub(crate) artifact: Artifact,
}

/// Image published; transitioning the host.
/// Available actions: `deploy()`
#[derive(Debug, Clone)]
pub struct Deploying {
    pub(crate) published: PublishedRef,
}

/// The new process started. Terminal.
/// Available actions: `finish()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Succeeded;

/// Stopped at the recorded stage and step. Terminal.
/// Available actions: `finish()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Failed;

macro_rules! state {
    ($($ty:ident => $status:ident),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}
            impl PipelineState for $ty {
                const STATUS: PipelineStatus = PipelineStatus::$status;
            }
        )*
    };
}

state! {
    Idle => Idle,
    Building => Building,
    Publishing => Publishing,
    Deploying => Deploying,
    Succeeded => Succeeded,
    Failed => Failed,
}

// ABOUTME: The ordered steps of a remote transition and their outcomes.
// ABOUTME: Shared by the remote executor, the startup runner, and the run record.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One step of moving a host from the old image to the new one.
///
/// Variants are declared in execution order, so `Ord` is execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionStep {
    StopOld,
    PullNew,
    StartNew,
    RunMigrations,
    RunSeed,
    StartProcess,
}

impl TransitionStep {
    pub const ALL: [TransitionStep; 6] = [
        TransitionStep::StopOld,
        TransitionStep::PullNew,
        TransitionStep::StartNew,
        TransitionStep::RunMigrations,
        TransitionStep::RunSeed,
        TransitionStep::StartProcess,
    ];

    /// Steps run by `hoist start` inside the new container.
    pub const STARTUP: [TransitionStep; 3] = [
        TransitionStep::RunMigrations,
        TransitionStep::RunSeed,
        TransitionStep::StartProcess,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionStep::StopOld => "stop-old",
            TransitionStep::PullNew => "pull-new",
            TransitionStep::StartNew => "start-new",
            TransitionStep::RunMigrations => "run-migrations",
            TransitionStep::RunSeed => "run-seed",
            TransitionStep::StartProcess => "start-process",
        }
    }
}

impl fmt::Display for TransitionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransitionStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransitionStep::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| format!("unknown transition step: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Succeeded,
    Failed,
    /// Never attempted because an earlier step failed.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step: TransitionStep,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

impl StepOutcome {
    pub fn succeeded(step: TransitionStep, detail: impl Into<String>) -> Self {
        Self {
            step,
            status: StepStatus::Succeeded,
            detail: detail.into(),
        }
    }

    pub fn failed(step: TransitionStep, detail: impl Into<String>) -> Self {
        Self {
            step,
            status: StepStatus::Failed,
            detail: detail.into(),
        }
    }

    pub fn skipped(step: TransitionStep, detail: impl Into<String>) -> Self {
        Self {
            step,
            status: StepStatus::Skipped,
            detail: detail.into(),
        }
    }
}

// ABOUTME: The record of one pipeline run, archived as JSON once it is terminal.
// ABOUTME: Holds the step outcomes and, for a failed run, where it stopped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

use super::PipelineStatus;
use crate::build::Artifact;
use crate::diagnostics::Warning;
use crate::publish::PublishedRef;
use crate::remote::OldContainerState;
use crate::step::{StepOutcome, TransitionStep};
use crate::types::{ContainerId, Revision, RunId};

/// Pipeline stage a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Building,
    Publishing,
    Deploying,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Building => "building",
            Stage::Publishing => "publishing",
            Stage::Deploying => "deploying",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub stage: Stage,
    /// Transition step that did not complete, when the failure was on the host.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<TransitionStep>,
    /// Earlier step whose failure kept `step` from running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<TransitionStep>,
    pub message: String,
    /// What the previously serving container was left doing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_container: Option<OldContainerState>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub id: RunId,
    pub revision: Revision,
    pub target: String,
    pub status: PipelineStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<PublishedRef>,
    pub publish_attempts: u32,
    pub steps: Vec<StepOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_container: Option<ContainerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    pub fn new(revision: Revision, target: impl Into<String>) -> Self {
        let started_at = Utc::now();
        Self {
            id: RunId::new(format!(
                "{}-{}",
                started_at.format("%Y%m%dT%H%M%S%.3fZ"),
                revision.short()
            )),
            revision,
            target: target.into(),
            status: PipelineStatus::Idle,
            fingerprint: None,
            artifact: None,
            published: None,
            publish_attempts: 0,
            steps: Vec::new(),
            new_container: None,
            failure: None,
            warnings: Vec::new(),
            started_at,
            finished_at: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == PipelineStatus::Succeeded
    }

    pub fn outcome(&self, step: TransitionStep) -> Option<&StepOutcome> {
        self.steps.iter().find(|o| o.step == step)
    }

    /// File name the run is archived under: `<timestamp>-<revision>.json`.
    pub fn archive_name(&self) -> String {
        format!(
            "{}-{}.json",
            self.started_at.format("%Y%m%dT%H%M%SZ"),
            self.revision
        )
    }

    /// Write the run as pretty JSON into `dir`, creating it if needed.
    pub fn archive(&self, dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(self.archive_name());
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }
}

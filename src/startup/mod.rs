// ABOUTME: Startup transition run inside the new container: migrate, seed, then start the service.
// ABOUTME: Fail-fast; the service process never starts after a failed migration or seed.

mod ledger;
mod marker;
mod runner;
mod scripts;
mod steps;

pub use ledger::{Ledger, LedgerError, LedgerKind, PsqlLedger, SslMode};
pub use marker::Marker;
pub use runner::StartupRunner;
pub use scripts::{Script, ScriptError, ScriptSet};
pub use steps::{ConfiguredSteps, StepAction, apply_scripts};

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Process exit codes of `hoist start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    Failure,
    MigrationFailed,
    SeedFailed,
    LaunchFailed,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::Failure => 1,
            ExitCode::MigrationFailed => 2,
            ExitCode::SeedFailed => 3,
            ExitCode::LaunchFailed => 4,
        }
    }

    pub fn from_code(code: i32) -> Option<ExitCode> {
        match code {
            0 => Some(ExitCode::Success),
            1 => Some(ExitCode::Failure),
            2 => Some(ExitCode::MigrationFailed),
            3 => Some(ExitCode::SeedFailed),
            4 => Some(ExitCode::LaunchFailed),
            _ => None,
        }
    }
}

/// Why a single startup step failed.
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Scripts(#[from] ScriptError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} exited with {status}")]
    Command { program: String, status: String },

    #[error("no command given")]
    NoCommand,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("migrations failed: {0}")]
    Migration(#[source] StepError),

    #[error("seeding failed: {0}")]
    Seed(#[source] StepError),

    #[error("could not start service: {0}")]
    Launch(#[source] StepError),
}

impl StartupError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            StartupError::Migration(_) => ExitCode::MigrationFailed,
            StartupError::Seed(_) => ExitCode::SeedFailed,
            StartupError::Launch(_) => ExitCode::LaunchFailed,
        }
    }
}

/// What a migration or seed step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepReport {
    /// SQL scripts applied through the ledger.
    Scripts { applied: usize, skipped: usize },
    /// An external tool ran and succeeded.
    Command,
    /// Nothing configured for this step.
    NotConfigured,
}

impl StepReport {
    pub fn applied(&self) -> usize {
        match self {
            StepReport::Scripts { applied, .. } => *applied,
            _ => 0,
        }
    }
}

impl fmt::Display for StepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepReport::Scripts { applied, skipped } => {
                write!(f, "applied {} (already applied {})", applied, skipped)
            }
            StepReport::Command => f.write_str("command succeeded"),
            StepReport::NotConfigured => f.write_str("applied 0 (not configured)"),
        }
    }
}

/// The three startup steps, in the order the runner calls them.
#[async_trait]
pub trait StartupSteps: Send {
    async fn run_migrations(&mut self) -> Result<StepReport, StepError>;

    async fn run_seed(&mut self) -> Result<StepReport, StepError>;

    /// Human-readable form of the service command, for the start marker.
    fn describe_process(&self) -> String;

    /// Start the service and return its exit code.
    ///
    /// On unix the production implementation replaces the current process
    /// and only returns on failure.
    async fn start_process(&mut self) -> Result<i32, StepError>;
}

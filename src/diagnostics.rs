// ABOUTME: Non-fatal problems met while a run is underway, kept on the run record.
// ABOUTME: A stuck lock file or an unremoved container is worth reporting but never fails a deploy.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// The lock file may still be on the host.
    LockRelease,
    SessionClose,
    /// Stopped containers of earlier revisions are still present.
    Cleanup,
    /// The run record could not be written locally.
    Archive,
}

impl WarningKind {
    fn headline(self) -> &'static str {
        match self {
            WarningKind::LockRelease => "deploy lock not released",
            WarningKind::SessionClose => "session not closed cleanly",
            WarningKind::Cleanup => "old containers not removed",
            WarningKind::Archive => "run record not archived",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.headline(), self.message)
    }
}

/// Warnings gathered during one stage, logged as they arrive.
#[derive(Debug, Default)]
pub struct Diagnostics(Vec<Warning>);

impl Diagnostics {
    pub fn record(&mut self, kind: WarningKind, message: impl Into<String>) {
        let warning = Warning::new(kind, message);
        tracing::warn!(kind = ?warning.kind, "{}", warning);
        self.0.push(warning);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.0
    }
}

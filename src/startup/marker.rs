// ABOUTME: Startup marker lines written by `hoist start` and read back by the deployer.
// ABOUTME: Format: `hoist-startup step=<step> status=<ok|failed> [detail]`.

use crate::step::TransitionStep;
use std::fmt;

pub const PREFIX: &str = "hoist-startup";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub step: TransitionStep,
    pub ok: bool,
    pub detail: String,
}

impl Marker {
    pub fn ok(step: TransitionStep, detail: impl Into<String>) -> Self {
        Self {
            step,
            ok: true,
            detail: detail.into(),
        }
    }

    pub fn failed(step: TransitionStep, detail: impl Into<String>) -> Self {
        Self {
            step,
            ok: false,
            detail: detail.into(),
        }
    }

    /// Find a marker anywhere in a log line.
    ///
    /// Log drivers may prefix lines with timestamps, so the prefix is searched
    /// for rather than required at column zero.
    pub fn parse(line: &str) -> Option<Marker> {
        let start = line.find(PREFIX)?;
        let rest = line[start + PREFIX.len()..].trim_start();

        let rest = rest.strip_prefix("step=")?;
        let (step, rest) = rest.split_once(' ').unwrap_or((rest, ""));
        let step = step.parse::<TransitionStep>().ok()?;

        let rest = rest.trim_start().strip_prefix("status=")?;
        let (status, detail) = rest.split_once(' ').unwrap_or((rest, ""));
        let ok = match status.trim_end() {
            "ok" => true,
            "failed" => false,
            _ => return None,
        };

        Some(Marker {
            step,
            ok,
            detail: detail.trim().to_string(),
        })
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.ok { "ok" } else { "failed" };
        write!(f, "{} step={} status={}", PREFIX, self.step, status)?;
        if !self.detail.is_empty() {
            // Markers are single lines.
            write!(f, " {}", self.detail.replace(['\n', '\r'], " "))?;
        }
        Ok(())
    }
}

/// Print a marker to stdout, where the container log collects it.
pub fn emit(marker: &Marker) {
    println!("{}", marker);
}

// ABOUTME: Reports a deploy run to the terminal as text, a single CI line, or JSON lines.
// ABOUTME: Formatting is pure; the Output type only decides what to print and where.

use serde::Serialize;
use std::fmt::Write as _;
use std::time::Instant;

use crate::deploy::{FailureRecord, PipelineRun};
use crate::diagnostics::Warning;
use crate::step::{StepOutcome, StepStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Progress lines and a step table.
    Normal,
    /// Only the final line; for CI logs.
    Quiet,
    /// One JSON object per line on stdout.
    Json,
}

/// JSON lines emitted in [`OutputMode::Json`].
#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum Event<'a> {
    Progress { message: &'a str },
    Warning { warning: &'a Warning },
    Run { run: &'a PipelineRun },
    Finished { ok: bool, message: &'a str, elapsed_secs: f64 },
}

pub struct Output {
    mode: OutputMode,
    started: Instant,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            started: Instant::now(),
        }
    }

    fn emit(&self, event: &Event<'_>) {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::error!("cannot serialize output event: {}", e),
        }
    }

    pub fn progress(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => println!("{message}"),
            OutputMode::Quiet => {}
            OutputMode::Json => self.emit(&Event::Progress { message }),
        }
    }

    pub fn warning(&self, warning: &Warning) {
        match self.mode {
            OutputMode::Json => self.emit(&Event::Warning { warning }),
            _ => eprintln!("Warning: {warning}"),
        }
    }

    /// Warnings and step table in text modes; the whole record in JSON mode.
    pub fn run(&self, run: &PipelineRun) {
        match self.mode {
            OutputMode::Json => self.emit(&Event::Run { run }),
            OutputMode::Quiet => run.warnings.iter().for_each(|w| self.warning(w)),
            OutputMode::Normal => {
                run.warnings.iter().for_each(|w| self.warning(w));
                print!("{}", step_table(&run.steps));
            }
        }
    }

    /// The last line of a deploy. Text-mode failures are left to the caller's error report.
    pub fn finished(&self, ok: bool, message: &str) {
        let elapsed_secs = self.started.elapsed().as_secs_f64();
        match (self.mode, ok) {
            (OutputMode::Json, _) => self.emit(&Event::Finished {
                ok,
                message,
                elapsed_secs,
            }),
            (OutputMode::Normal, true) => println!("{message} ({elapsed_secs:.1}s)"),
            (OutputMode::Quiet, true) => println!("{message}"),
            (_, false) => {}
        }
    }
}

fn status_label(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Succeeded => "ok",
        StepStatus::Failed => "FAILED",
        StepStatus::Skipped => "skipped",
    }
}

/// One indented line per transition step: name, status, detail.
pub fn step_table(steps: &[StepOutcome]) -> String {
    steps.iter().fold(String::new(), |mut table, outcome| {
        let _ = writeln!(
            table,
            "  {:<15} {:<8} {}",
            outcome.step,
            status_label(outcome.status),
            outcome.detail
        );
        table
    })
}

/// "deploying failed at start-process (blocked by run-migrations): ..."
pub fn failure_summary(failure: &FailureRecord) -> String {
    let mut summary = format!("{} failed", failure.stage);
    if let Some(step) = failure.step {
        let _ = write!(summary, " at {step}");
    }
    if let Some(blocked_by) = failure.blocked_by {
        let _ = write!(summary, " (blocked by {blocked_by})");
    }
    let _ = write!(summary, ": {}", failure.message);
    summary
}

// ABOUTME: Watches a freshly started container until `hoist start` reports the process running.
// ABOUTME: Reads startup markers from the container log and the container state.

use std::collections::BTreeMap;
use std::time::Duration;

use super::{ContainerCli, RemoteShell};
use crate::startup::{ExitCode, Marker};
use crate::step::{StepOutcome, TransitionStep};
use crate::types::ContainerId;

/// Where and why startup stopped short of a running process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupFailure {
    /// The step that did not complete. A migration or seed failure is
    /// reported here as `StartProcess`, with the cause in `blocked_by`.
    pub step: TransitionStep,
    pub blocked_by: Option<TransitionStep>,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct StartupObservation {
    pub steps: Vec<StepOutcome>,
    pub failure: Option<StartupFailure>,
}

impl StartupObservation {
    pub fn success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Container state as printed by `inspect_state`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ContainerState {
    status: String,
    exit_code: i32,
}

impl ContainerState {
    fn parse(stdout: &str) -> Option<Self> {
        let mut parts = stdout.split_whitespace();
        let status = parts.next()?.to_string();
        let exit_code = parts.next()?.parse().ok()?;
        Some(Self { status, exit_code })
    }

    fn is_running(&self) -> bool {
        self.status == "running"
    }

    /// Exited, or crashed and waiting for the restart policy.
    fn has_stopped(&self) -> bool {
        matches!(self.status.as_str(), "exited" | "dead" | "restarting")
    }
}

/// Poll `container` until startup succeeds, fails, or `timeout` elapses.
pub async fn observe_startup<S: RemoteShell>(
    shell: &S,
    cli: &ContainerCli,
    container: &ContainerId,
    timeout: Duration,
    interval: Duration,
) -> StartupObservation {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut markers = BTreeMap::new();
    let mut last_problem = None;

    loop {
        match shell.exec(&cli.logs(container)).await {
            Ok(output) => {
                markers = collect_markers(&output.stdout);
            }
            Err(e) => last_problem = Some(format!("reading container logs: {}", e)),
        }

        let state = match shell.exec(&cli.inspect_state(container)).await {
            Ok(output) if output.success() => ContainerState::parse(&output.stdout),
            Ok(output) => {
                last_problem = Some(format!("inspecting container: {}", output.diagnostic()));
                None
            }
            Err(e) => {
                last_problem = Some(format!("inspecting container: {}", e));
                None
            }
        };

        if let Some(observation) = evaluate(&markers, state.as_ref()) {
            return observation;
        }

        if tokio::time::Instant::now() >= deadline {
            let pending = first_unmarked(&markers);
            let mut message = format!(
                "no {} marker within {}s",
                pending,
                timeout.as_secs()
            );
            if let Some(problem) = last_problem {
                message.push_str(&format!(" (last error: {})", problem));
            }
            return failed(&markers, pending, message);
        }

        tracing::debug!(
            "waiting for startup of {} ({} marker(s) so far)",
            container.short(),
            markers.len()
        );
        tokio::time::sleep(interval).await;
    }
}

/// Latest marker per step. A restarted container appends to the same log,
/// so later markers replace earlier ones.
fn collect_markers(log: &str) -> BTreeMap<TransitionStep, Marker> {
    let mut markers = BTreeMap::new();
    for marker in log.lines().filter_map(Marker::parse) {
        if TransitionStep::STARTUP.contains(&marker.step) {
            markers.insert(marker.step, marker);
        }
    }
    markers
}

fn first_unmarked(markers: &BTreeMap<TransitionStep, Marker>) -> TransitionStep {
    TransitionStep::STARTUP
        .into_iter()
        .find(|step| !markers.contains_key(step))
        .unwrap_or(TransitionStep::StartProcess)
}

fn evaluate(
    markers: &BTreeMap<TransitionStep, Marker>,
    state: Option<&ContainerState>,
) -> Option<StartupObservation> {
    if let Some(marker) = markers.values().find(|m| !m.ok) {
        return Some(failed(markers, marker.step, marker.detail.clone()));
    }

    let started = markers.contains_key(&TransitionStep::StartProcess);
    let state = state?;

    if started && state.is_running() {
        return Some(StartupObservation {
            steps: outcomes(markers),
            failure: None,
        });
    }

    if state.has_stopped() {
        // Markers outrank the exit code: once the service runs, its own exit
        // status may collide with the runner's codes.
        let step = match exit_code_step(state.exit_code) {
            _ if started => TransitionStep::StartProcess,
            Some(step) if markers.contains_key(&step) => TransitionStep::StartProcess,
            Some(step) => step,
            None => first_unmarked(markers),
        };
        let message = format!(
            "container {} with exit code {}",
            state.status, state.exit_code
        );
        return Some(failed(markers, step, message));
    }

    None
}

/// The step `hoist start` names through its exit status.
fn exit_code_step(code: i32) -> Option<TransitionStep> {
    match ExitCode::from_code(code)? {
        ExitCode::MigrationFailed => Some(TransitionStep::RunMigrations),
        ExitCode::SeedFailed => Some(TransitionStep::RunSeed),
        ExitCode::LaunchFailed => Some(TransitionStep::StartProcess),
        _ => None,
    }
}

fn failed(
    markers: &BTreeMap<TransitionStep, Marker>,
    step: TransitionStep,
    message: String,
) -> StartupObservation {
    let mut steps = Vec::new();
    for candidate in TransitionStep::STARTUP {
        if candidate < step {
            match markers.get(&candidate) {
                Some(marker) => steps.push(StepOutcome::succeeded(candidate, marker.detail.clone())),
                None => steps.push(StepOutcome::skipped(candidate, "no marker")),
            }
        } else if candidate == step {
            steps.push(StepOutcome::failed(candidate, message.clone()));
        } else {
            steps.push(StepOutcome::skipped(candidate, format!("blocked by {}", step)));
        }
    }

    let (step, blocked_by) = if step == TransitionStep::StartProcess {
        (step, None)
    } else {
        (TransitionStep::StartProcess, Some(step))
    };

    StartupObservation {
        steps,
        failure: Some(StartupFailure {
            step,
            blocked_by,
            message,
        }),
    }
}

fn outcomes(markers: &BTreeMap<TransitionStep, Marker>) -> Vec<StepOutcome> {
    markers
        .values()
        .map(|m| StepOutcome::succeeded(m.step, m.detail.clone()))
        .collect()
}

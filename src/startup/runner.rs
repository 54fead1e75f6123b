// ABOUTME: Drives the startup steps in order and reports each through a marker line.
// ABOUTME: A failed migration or seed ends the run before the service is started.

use super::{Marker, StartupError, StartupSteps, marker};
use crate::step::TransitionStep;

pub struct StartupRunner<S> {
    steps: S,
    markers: Vec<Marker>,
    print: bool,
}

impl<S: StartupSteps> StartupRunner<S> {
    pub fn new(steps: S) -> Self {
        Self {
            steps,
            markers: Vec::new(),
            print: true,
        }
    }

    /// Keep markers in memory only.
    pub fn silent(mut self) -> Self {
        self.print = false;
        self
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn steps(&self) -> &S {
        &self.steps
    }

    /// Run migrations, seed, then the service. Returns the service's exit code.
    pub async fn run(&mut self) -> Result<i32, StartupError> {
        match self.steps.run_migrations().await {
            Ok(report) => self.record(Marker::ok(TransitionStep::RunMigrations, report.to_string())),
            Err(e) => {
                self.record(Marker::failed(TransitionStep::RunMigrations, e.to_string()));
                return Err(StartupError::Migration(e));
            }
        }

        match self.steps.run_seed().await {
            Ok(report) => self.record(Marker::ok(TransitionStep::RunSeed, report.to_string())),
            Err(e) => {
                self.record(Marker::failed(TransitionStep::RunSeed, e.to_string()));
                return Err(StartupError::Seed(e));
            }
        }

        // Written before launch: on unix a successful launch never returns.
        let command = self.steps.describe_process();
        self.record(Marker::ok(TransitionStep::StartProcess, command));

        match self.steps.start_process().await {
            Ok(code) => Ok(code),
            Err(e) => {
                self.record(Marker::failed(TransitionStep::StartProcess, e.to_string()));
                Err(StartupError::Launch(e))
            }
        }
    }

    fn record(&mut self, entry: Marker) {
        if entry.ok {
            tracing::info!("{} succeeded: {}", entry.step, entry.detail);
        } else {
            tracing::error!("{} failed: {}", entry.step, entry.detail);
        }
        if self.print {
            marker::emit(&entry);
        }
        self.markers.push(entry);
    }
}

// ABOUTME: Production startup steps: SQL scripts through a ledger, or external commands.
// ABOUTME: The service command replaces this process on unix.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use super::{Ledger, LedgerKind, ScriptSet, StartupSteps, StepError, StepReport};

/// How one of the migrate/seed steps is carried out.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StepAction {
    /// Reported as succeeded with nothing applied.
    #[default]
    None,
    /// `NNNN_name.sql` files applied once each, tracked in the ledger.
    Sql { dir: PathBuf },
    /// An external tool responsible for its own idempotence.
    Command { argv: Vec<String> },
}

impl StepAction {
    /// A shell command line, run with `sh -c`.
    pub fn shell(command: impl Into<String>) -> Self {
        StepAction::Command {
            argv: vec!["sh".to_string(), "-c".to_string(), command.into()],
        }
    }
}

pub struct ConfiguredSteps<L> {
    ledger: L,
    migrations: StepAction,
    seed: StepAction,
    process: Vec<String>,
    replace_process: bool,
}

impl<L: Ledger> ConfiguredSteps<L> {
    pub fn new(ledger: L, process: Vec<String>) -> Self {
        Self {
            ledger,
            migrations: StepAction::None,
            seed: StepAction::None,
            process,
            replace_process: cfg!(unix),
        }
    }

    pub fn migrations(mut self, action: StepAction) -> Self {
        self.migrations = action;
        self
    }

    pub fn seed(mut self, action: StepAction) -> Self {
        self.seed = action;
        self
    }

    /// Spawn the service as a child and wait for it instead of exec'ing.
    pub fn spawn_process(mut self) -> Self {
        self.replace_process = false;
        self
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    async fn run_action(&self, kind: LedgerKind, action: &StepAction) -> Result<StepReport, StepError> {
        match action {
            StepAction::None => Ok(StepReport::NotConfigured),
            StepAction::Sql { dir } => apply_scripts(&self.ledger, kind, dir).await,
            StepAction::Command { argv } => {
                run_command(argv).await?;
                Ok(StepReport::Command)
            }
        }
    }
}

/// Apply every script in `dir` the ledger has not recorded yet, in version order.
pub async fn apply_scripts<L: Ledger + ?Sized>(
    ledger: &L,
    kind: LedgerKind,
    dir: &Path,
) -> Result<StepReport, StepError> {
    let set = ScriptSet::load(dir)?;
    ledger.prepare(kind).await?;
    let done = ledger.applied(kind).await?;

    let mut applied = 0;
    let mut skipped = 0;
    for script in set.iter() {
        if done.contains(&script.key) {
            tracing::debug!("{} already applied", script.key);
            skipped += 1;
            continue;
        }
        let sql = script.sql()?;
        ledger.apply(kind, &script.key, &sql).await?;
        tracing::info!("applied {}", script.key);
        applied += 1;
    }

    Ok(StepReport::Scripts { applied, skipped })
}

async fn run_command(argv: &[String]) -> Result<(), StepError> {
    let (program, args) = argv.split_first().ok_or(StepError::NoCommand)?;
    let status = Command::new(program)
        .args(args)
        .status()
        .await
        .map_err(|source| StepError::Spawn {
            program: program.clone(),
            source,
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(StepError::Command {
            program: program.clone(),
            status: status.to_string(),
        })
    }
}

#[async_trait]
impl<L: Ledger> StartupSteps for ConfiguredSteps<L> {
    async fn run_migrations(&mut self) -> Result<StepReport, StepError> {
        self.run_action(LedgerKind::Migrations, &self.migrations).await
    }

    async fn run_seed(&mut self) -> Result<StepReport, StepError> {
        self.run_action(LedgerKind::Seeds, &self.seed).await
    }

    fn describe_process(&self) -> String {
        self.process.join(" ")
    }

    async fn start_process(&mut self) -> Result<i32, StepError> {
        let (program, args) = self.process.split_first().ok_or(StepError::NoCommand)?;
        let spawn_error = |source: std::io::Error| StepError::Spawn {
            program: program.clone(),
            source,
        };

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;

            if self.replace_process {
                // Only returns on failure.
                let error = std::process::Command::new(program).args(args).exec();
                return Err(spawn_error(error));
            }
        }

        let status = Command::new(program)
            .args(args)
            .status()
            .await
            .map_err(spawn_error)?;
        Ok(status.code().unwrap_or(1))
    }
}

// ABOUTME: Entry point for the hoist CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;

use clap::Parser;
use cli::{Cli, Commands, DeployArgs, StartArgs};
use hoist::build::CliBuilder;
use hoist::config::{self, Config, RuntimeEnv};
use hoist::deploy::{DeployRequest, Sequencer};
use hoist::diagnostics::{Warning, WarningKind};
use hoist::error::{Error, Result};
use hoist::output::{self, Output, OutputMode};
use hoist::publish::CliRegistry;
use hoist::ssh::SshConnector;
use hoist::startup::{ConfiguredSteps, PsqlLedger, StartupRunner, StepAction};
use hoist::types::Revision;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

/// Returns the process exit code.
async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Init {
            service,
            image,
            force,
        } => {
            let cwd = env::current_dir()?;
            let path = config::init_config(&cwd, service.as_deref(), image.as_deref(), force)?;
            println!("Created {}", path.display());
            Ok(0)
        }
        Commands::Deploy(args) => deploy(args).await.map(|()| 0),
        Commands::Start(args) => start(args).await,
    }
}

async fn deploy(args: DeployArgs) -> Result<()> {
    let mode = if args.json {
        OutputMode::Json
    } else if args.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };
    let output = Output::new(mode);

    let cwd = env::current_dir()?;
    let config = Config::discover(&cwd)?;
    let config = match args.destination {
        Some(ref dest) => config.for_destination(dest)?,
        None => config,
    };

    let revision = args
        .revision
        .or_else(|| env::var("GITHUB_SHA").ok())
        .filter(|r| !r.trim().is_empty())
        .ok_or(Error::MissingRevision)?;
    let revision = Revision::new(revision.trim())?;

    let request = DeployRequest::from_config(&config, revision, args.force)?;
    output.progress(&format!(
        "Deploying {} at {} to {}",
        request.image,
        request.revision.short(),
        request.deploy.target.host
    ));

    let sequencer = Sequencer::new(
        CliBuilder::from_config(&config.build),
        CliRegistry::new(config.build.binary.clone()),
        SshConnector,
    );
    let run = sequencer.run(&request).await;

    output.run(&run);
    match run.archive(&cwd.join(&config.archive_dir)) {
        Ok(path) => output.progress(&format!("Run recorded in {}", path.display())),
        Err(e) => output.warning(&Warning::new(WarningKind::Archive, e.to_string())),
    }

    if run.succeeded() {
        output.finished(
            true,
            &format!("Deployed {} at {}", config.service, run.revision),
        );
        return Ok(());
    }

    let message = match run.failure {
        Some(ref failure) => output::failure_summary(failure),
        None => format!("run ended as {}", run.status),
    };
    output.finished(false, &message);
    Err(Error::DeployFailed(message))
}

async fn start(args: StartArgs) -> Result<i32> {
    let env = RuntimeEnv::resolve(&HashMap::new())?;
    let steps = ConfiguredSteps::new(PsqlLedger::from_env(&env), args.command)
        .migrations(step_action(args.migrations, args.migrate_cmd))
        .seed(step_action(args.seeds, args.seed_cmd));

    let mut runner = StartupRunner::new(steps);
    Ok(runner.run().await?)
}

fn step_action(dir: Option<PathBuf>, command: Option<String>) -> StepAction {
    match (dir, command) {
        (Some(dir), _) => StepAction::Sql { dir },
        (None, Some(command)) => StepAction::shell(command),
        (None, None) => StepAction::None,
    }
}

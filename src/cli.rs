// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines the init, deploy, and start subcommands and their arguments.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hoist")]
#[command(about = "Build, publish, and roll a container image onto a remote host")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a hoist.yml template into the current directory
    Init {
        /// Service name
        #[arg(long)]
        service: Option<String>,

        /// Image repository, e.g. ghcr.io/acme/api
        #[arg(long)]
        image: Option<String>,

        /// Overwrite an existing hoist.yml
        #[arg(long)]
        force: bool,
    },

    /// Build, publish, and deploy a source revision
    Deploy(DeployArgs),

    /// Container entrypoint: migrate, seed, then exec the service
    Start(StartArgs),
}

#[derive(Args)]
pub struct DeployArgs {
    /// Source revision to deploy [default: $GITHUB_SHA]
    #[arg(short, long)]
    pub revision: Option<String>,

    /// Target destination (defined in config)
    #[arg(short, long)]
    pub destination: Option<String>,

    /// Break a deploy lock held by another run
    #[arg(long)]
    pub force: bool,

    /// Print only the final result
    #[arg(short, long, conflicts_with = "json")]
    pub quiet: bool,

    /// Print JSON lines
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct StartArgs {
    /// Directory of NNNN_name.sql migrations
    #[arg(long, conflicts_with = "migrate_cmd")]
    pub migrations: Option<PathBuf>,

    /// Directory of NNNN_name.sql seed scripts
    #[arg(long, conflicts_with = "seed_cmd")]
    pub seeds: Option<PathBuf>,

    /// Shell command that applies migrations
    #[arg(long)]
    pub migrate_cmd: Option<String>,

    /// Shell command that seeds the database
    #[arg(long)]
    pub seed_cmd: Option<String>,

    /// Service command, e.g. `-- node dist/main.js`
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

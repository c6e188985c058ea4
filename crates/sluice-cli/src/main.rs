use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use sluice_config::VersionScheme;
use tracing_subscriber::EnvFilter;

mod commands;
mod utils;
use commands::{cmd_check, cmd_down, cmd_init, cmd_migrate, cmd_new, cmd_status, cmd_unlock, cmd_up};
use utils::ProjectArgs;

/// sluice command-line interface.
#[derive(Parser, Debug)]
#[command(name = "sluice", author, version, about)]
struct Cli {
    #[command(flatten)]
    project: ProjectArgs,
    /// Raise log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG wins.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize sluice.json with defaults and create the migrations directory.
    Init {
        #[arg(long, value_enum)]
        scheme: Option<VersionScheme>,
    },
    /// Create an empty up/down script pair for the next version.
    New {
        #[arg(short = 'm', long = "message")]
        message: String,
    },
    /// Load and validate every migration script.
    Check,
    /// Show applied, pending and ignored migrations.
    Status,
    /// Apply pending migrations.
    Up {
        /// Stop after this version.
        target: Option<String>,
        /// Print the plan without running it.
        #[arg(long)]
        dry_run: bool,
    },
    /// Revert applied migrations (the latest one by default).
    Down {
        /// Revert every applied version down to and including this one.
        target: Option<String>,
        /// Revert everything.
        #[arg(long, conflicts_with = "target")]
        all: bool,
        #[arg(long)]
        dry_run: bool,
    },
    /// Apply or revert until the given version is the latest applied.
    Migrate {
        /// Target version; the newest migration when omitted.
        #[arg(long)]
        to: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Force-release the migration lock left by a crashed run.
    Unlock,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let project = &cli.project;
    match cli.command {
        Commands::Init { scheme } => cmd_init(project, scheme),
        Commands::New { message } => cmd_new(project, message),
        Commands::Check => cmd_check(project),
        Commands::Status => cmd_status(project),
        Commands::Up { target, dry_run } => cmd_up(project, target, dry_run),
        Commands::Down {
            target,
            all,
            dry_run,
        } => cmd_down(project, target, all, dry_run),
        Commands::Migrate { to, dry_run } => cmd_migrate(project, to, dry_run),
        Commands::Unlock => cmd_unlock(project),
    }
}

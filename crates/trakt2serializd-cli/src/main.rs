use clap::{ArgAction, Parser};
use media_migrate_config::DEFAULT_LOG_FILE;
use media_migrate_core::LogHealth;
use std::path::PathBuf;

mod commands;
mod exit_code;
mod logging;
mod output;

use commands::migrate::{self, MigrateArgs};

#[derive(Parser)]
#[command(name = "trakt2serializd")]
#[command(about = "Copy your Trakt watch history to Serializd")]
#[command(long_about = "Authenticate with Trakt and Serializd, read every watched show and episode from Trakt, find each show on Serializd and mark the episodes watched there. Every step is logged to the console and appended to migration.log.")]
#[command(version)]
struct Cli {
    /// Enable verbose output (use multiple times for more verbosity: -v, -vv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,

    /// Output format
    #[arg(long, default_value = "human", value_enum)]
    output: output::OutputFormat,

    /// Config file (defaults to ~/.config/trakt2serializd/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Append-only migration log
    #[arg(long, value_name = "PATH", default_value = DEFAULT_LOG_FILE)]
    log_file: PathBuf,

    /// Skip the confirmation prompt before writing to Serializd
    #[arg(short, long, action = ArgAction::SetTrue)]
    yes: bool,

    /// Match shows and plan writes without marking anything on Serializd
    #[arg(long, action = ArgAction::SetTrue)]
    dry_run: bool,

    /// Ignore cached Trakt tokens and do not store new ones
    #[arg(long, action = ArgAction::SetTrue)]
    no_cache: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let health = LogHealth::new();
    let log_guard = logging::init_logging(cli.verbose, cli.quiet, &cli.log_file, health.clone())
        .map_err(|e| color_eyre::eyre::eyre!("{}", e))?;

    let output = output::Output::new(cli.output, cli.quiet);
    let args = MigrateArgs {
        config_path: cli.config,
        yes: cli.yes,
        dry_run: cli.dry_run,
        no_cache: cli.no_cache,
    };

    let code = match migrate::run_migrate(args, &output, health).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            output.error(format!("{:#}", e));
            exit_code::CONFIG_ERROR
        }
    };

    // Flush migration.log before leaving
    drop(log_guard);
    std::process::exit(code);
}

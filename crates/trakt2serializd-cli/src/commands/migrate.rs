use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use media_migrate_config::{Config, CredentialStore, PathManager, TraktConfig};
use media_migrate_models::RunOutcome;
use media_migrate_core::{
    CancellationFlag, LogHealth, MarkingOptions, MigrationRunner, ProgressLogger, ShowMatcher, WatchMarker,
};
use media_migrate_sources::{RateLimiter, SerializdClient, SerializdCredentials, TraktClient};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::commands::progress_ui::MigrationUI;
use crate::commands::prompts::{prompt_password, prompt_required, prompt_yes_no};
use crate::exit_code;
use crate::output::Output;

pub struct MigrateArgs {
    pub config_path: Option<PathBuf>,
    pub yes: bool,
    pub dry_run: bool,
    pub no_cache: bool,
}

/// Config file and credential cache locations. An explicit config path
/// keeps the cache next to it.
fn resolve_paths(config_path: Option<PathBuf>) -> (PathManager, PathBuf) {
    match config_path {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            (PathManager::with_config_dir(dir), path)
        }
        None => {
            let paths = PathManager::default();
            let file = paths.config_file();
            (paths, file)
        }
    }
}

/// Trakt API app credentials, prompting (and offering to save) when missing
fn trakt_app_credentials(config: &mut Config, config_file: &Path, output: &Output) -> Result<TraktConfig> {
    if config.is_trakt_configured() {
        if let Some(trakt) = &config.trakt {
            return Ok(trakt.clone());
        }
    }

    output.info("Trakt API credentials are needed. Create an app at https://trakt.tv/oauth/applications");
    output.info("(use urn:ietf:wg:oauth:2.0:oob as the redirect URI).");
    let trakt = TraktConfig {
        client_id: prompt_required("Trakt Client ID", None)?,
        client_secret: prompt_required("Trakt Client Secret", None)?,
    };
    config.trakt = Some(trakt.clone());

    if prompt_yes_no(&format!("Save Trakt credentials to {}?", config_file.display()), Some(true))? {
        config
            .save_to_file(config_file)
            .map_err(|e| eyre!("Failed to save config: {}", e))?;
        output.success(format!("Saved {}", config_file.display()));
    }
    Ok(trakt)
}

fn serializd_credentials(config: &Config) -> Result<SerializdCredentials> {
    let email = prompt_required("Serializd email", config.serializd_email())?;
    let password = prompt_password("Serializd password")?;
    if password.is_empty() {
        return Err(eyre!("A Serializd password is required"));
    }
    Ok(SerializdCredentials::new(email, password))
}

/// Ctrl-C sets the flag; the runner stops at the next show or season
fn install_interrupt_handler(cancel: CancellationFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing the current request");
            cancel.cancel();
        }
    });
}

pub async fn run_migrate(args: MigrateArgs, output: &Output, health: LogHealth) -> Result<i32> {
    let (paths, config_file) = resolve_paths(args.config_path);
    let mut config = Config::load_or_default(&config_file)
        .map_err(|e| eyre!("{}", e))
        .wrap_err_with(|| format!("Failed to load {}", config_file.display()))?;
    config.validate().map_err(|e| eyre!("Invalid configuration: {}", e))?;

    let trakt = trakt_app_credentials(&mut config, &config_file, output)?;
    let serializd = serializd_credentials(&config)?;

    let cancel = CancellationFlag::new();
    install_interrupt_handler(cancel.clone());

    let mut source = TraktClient::new(trakt.client_id, trakt.client_secret, cancel.clone());
    if !args.no_cache {
        let mut store = CredentialStore::new(paths.credentials_file());
        match store.load() {
            Ok(()) => source = source.with_credential_store(store),
            Err(e) => warn!("Ignoring unreadable credential cache: {}", e),
        }
    }
    let destination = SerializdClient::new(serializd, RateLimiter::from_config(&config.rate_limit));

    let progress = ProgressLogger::new()
        .with_health(health)
        .with_dry_run(args.dry_run)
        .with_sink(Box::new(MigrationUI::new(output.is_human() && !output.is_quiet())));

    let mut runner = MigrationRunner::new(Box::new(source), Box::new(destination), progress, cancel)
        .with_matcher(ShowMatcher::from_config(&config.matching))
        .with_marker(WatchMarker::new(MarkingOptions::from_config(&config.marking, args.dry_run)));

    if let Err(e) = runner.authenticate().await {
        output.error(format!("Authentication failed: {}", e));
        return Ok(exit_code::for_error(&e));
    }
    output.success("Authenticated with Serializd and Trakt");

    let shows = match runner.fetch().await {
        Ok(shows) => shows,
        Err(e) => {
            output.error(format!("Could not read Trakt history: {}", e));
            return Ok(exit_code::for_error(&e));
        }
    };
    let episodes: usize = shows.iter().map(|s| s.episode_count()).sum();
    output.info(format!("Found {} watched shows with {} episodes on Trakt", shows.len(), episodes));

    if args.dry_run {
        output.warn("Dry run: nothing will be written to Serializd");
    } else if !args.yes && !shows.is_empty() {
        let proceed = prompt_yes_no(
            &format!("Mark {} episodes as watched on Serializd?", episodes),
            Some(true),
        )?;
        if !proceed {
            output.warn("Migration cancelled, nothing was written");
            info!("Migration declined at the confirmation prompt");
            return Ok(exit_code::SUCCESS);
        }
    }

    let summary = runner.migrate(shows).await;
    output.summary(&summary);

    let outcome = summary.outcome();
    match outcome {
        RunOutcome::Success => output.success("Migration finished"),
        RunOutcome::Partial => output.warn("Migration finished with unresolved shows or failed writes, see the log"),
        RunOutcome::LogIncomplete => output.warn("Migration finished but some lines could not be written to the log"),
        RunOutcome::Interrupted => output.warn("Migration interrupted, partial summary written to the log"),
        RunOutcome::TotalFailure => match &summary.aborted {
            Some(reason) => output.error(format!("Migration aborted: {}", reason)),
            None => output.error("No show could be migrated"),
        },
    }
    Ok(exit_code::for_outcome(outcome))
}

mod host;
mod store;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::{
    fs::{self, OpenOptions},
    path::PathBuf,
    sync::Arc,
};

use romvault_core::{
    config::{self, AppConfig},
    InstallState, LegacyGame, Library, LibraryContext, UninstallState,
};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

use host::{ConsoleHost, Outcome};
use store::GameStore;

/// Catalog and install ROMs for configured emulators
#[derive(Parser)]
#[command(name = "romvault")]
#[command(about = "Scan ROM sources and install games to fast local storage")]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan every enabled mapping and store the game list
    Scan {
        /// Print the scanned games as JSON
        #[arg(long)]
        json: bool,
    },
    /// Install a game by name or id
    Install { game: String },
    /// Uninstall a game by name or id
    Uninstall { game: String },
    /// Show the decoded id of a game
    Describe { game: String },
    /// Convert legacy ids listed in a JSON file to versioned ids
    Migrate { legacy: PathBuf },
    /// Remove uninstalled games whose source files are gone
    Prune {
        /// Only list what would be removed
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging()?;

    let config_path = match cli.config {
        Some(path) => path,
        None => config::ensure_default_config()?,
    };
    let config = AppConfig::load_from(&config_path)?;
    let mut store = GameStore::load(GameStore::path_in(&config.data_dir))?;

    let host = Arc::new(ConsoleHost::default());
    let ctx = LibraryContext::new(
        Arc::new(config.clone()),
        host.clone(),
        config.path_variables(),
        config.cache_dir(),
    );
    let library = Library::new(Arc::new(ctx));
    let cancel = CancellationToken::new();

    match cli.command {
        Commands::Scan { json } => {
            let games: Vec<_> = library.games(&cancel).collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&games)?);
            } else {
                for game in &games {
                    let status = if game.is_installed { "installed" } else { "available" };
                    println!("{:<10} {:<24} {}", status, game.platform, game.name);
                }
            }
            info!(count = games.len(), "Scan complete");
            store.replace_with_scan(&games);
            store.save()?;
        }
        Commands::Install { game } => {
            let game = store.find(&game)?;
            if game.is_installed {
                bail!("{} is already installed", game.name);
            }
            let controller = library.install_controller(&game)?;
            controller.install()?;
            let state = controller.wait().await;
            apply_outcomes(&mut store, &host)?;
            match state {
                InstallState::Installed => println!("Installed {}", game.name),
                InstallState::Cancelled => println!("Install of {} was cancelled", game.name),
                InstallState::Failed(err) => bail!("failed to install {}: {err}", game.name),
                other => bail!("install of {} ended in state {other:?}", game.name),
            }
        }
        Commands::Uninstall { game } => {
            let game = store.find(&game)?;
            let controller = library.uninstall_controller(&game)?;
            controller.uninstall();
            let state = controller.wait().await;
            apply_outcomes(&mut store, &host)?;
            match state {
                UninstallState::Uninstalled => println!("Uninstalled {}", game.name),
                UninstallState::Cancelled => println!("Uninstall of {} was cancelled", game.name),
                UninstallState::Failed(err) => bail!("failed to uninstall {}: {err}", game.name),
                other => bail!("uninstall of {} ended in state {other:?}", game.name),
            }
        }
        Commands::Describe { game } => {
            let game = store.find(&game)?;
            print!("{}", library.describe(&game));
        }
        Commands::Migrate { legacy } => {
            let contents = fs::read_to_string(&legacy)
                .with_context(|| format!("failed to read {}", legacy.display()))?;
            let games: Vec<LegacyGame> = serde_json::from_str(&contents)
                .with_context(|| format!("failed to parse {}", legacy.display()))?;
            let migrations = library.migrate_legacy_ids(&games);
            for migration in &migrations {
                store.rename_id(&migration.old_id, &migration.new_id);
            }
            println!("{}", serde_json::to_string_pretty(&migrations)?);
            store.save()?;
        }
        Commands::Prune { dry_run } => {
            let missing = library.games_missing_source(store.games(), &cancel);
            if missing.is_empty() {
                println!("Nothing to do.");
                return Ok(());
            }
            for game in &missing {
                println!("{}", game.name);
            }
            if !dry_run {
                let ids: Vec<String> = missing.into_iter().map(|game| game.game_id).collect();
                store.remove(&ids);
                store.save()?;
                println!("Removed {} library entries", ids.len());
            }
        }
    }

    Ok(())
}

fn apply_outcomes(store: &mut GameStore, host: &ConsoleHost) -> Result<()> {
    for outcome in host.take_outcomes() {
        match outcome {
            Outcome::Installed(id, data) => store.mark_installed(&id, data),
            Outcome::Uninstalled(id) => store.mark_uninstalled(&id),
            Outcome::Aborted(id) => info!(game = %id, "Install aborted"),
            Outcome::UninstallAborted(id) => info!(game = %id, "Uninstall aborted"),
        }
    }
    store.save()
}

fn init_logging() -> Result<()> {
    let log_dir = std::env::current_dir()?.join("logs");
    fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join("romvault.log");

    let env_filter = EnvFilter::from_default_env();

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .compact()
        .with_ansi(false)
        .with_writer(move || {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
                .expect("failed to open log file")
        });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    Ok(())
}

use anyhow::Result;
use clap::{Parser, Subcommand};
use modscout::config::Paths;
use modscout::games::GameType;
use modscout::{App, Config};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "modscout")]
#[command(
    author,
    version,
    about = "Identify Mass Effect mod archives and check them for updates"
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the mods inside an archive
    Import {
        /// Archive to inspect (.zip, .7z or self-extracting .exe)
        path: PathBuf,

        /// Game to assume when the archive does not say (ME1..ME3, LE1..LE3)
        #[arg(long, value_parser = GameType::from_cli)]
        game: Option<GameType>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve every archive under a directory
    Scan {
        dir: PathBuf,

        #[arg(long, value_parser = GameType::from_cli)]
        game: Option<GameType>,
    },

    /// Print an archive's MD5 and size
    Hash { path: PathBuf },

    /// Resolve archives and check their mods for updates
    Updates {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Report the current server release even when the local copy is not older
        #[arg(long)]
        restore: bool,
    },

    /// Identification catalogue maintenance
    Catalogue {
        #[command(subcommand)]
        action: CatalogueCommands,
    },
}

#[derive(Subcommand)]
enum CatalogueCommands {
    /// Download both catalogues now
    Refresh,
}

fn setup_logging(verbosity: u8, log_file: &Path) {
    let filter = match verbosity {
        0 => "modscout=warn",
        1 => "modscout=info",
        2 => "modscout=debug",
        _ => "trace",
    };

    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());
    macro_rules! stderr_layer {
        () => {
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
        };
    }

    let file = log_file
        .parent()
        .map(std::fs::create_dir_all)
        .transpose()
        .and_then(|_| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_file)
        });

    match file {
        Ok(file) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(std::sync::Arc::new(file));
            tracing_subscriber::registry()
                .with(env_filter)
                .with(file_layer)
                .with(stderr_layer!())
                .init();
        }
        Err(e) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer!())
                .init();
            tracing::warn!("Could not open log file {}: {}", log_file.display(), e);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let paths = Paths::new()?;
    setup_logging(cli.verbose, &paths.log_file());

    let config = Config::load(&paths).await?;
    let app = App::new(config, paths).await?;

    match cli.command {
        Commands::Import { path, game, json } => app.cmd_import(&path, game, json).await?,
        Commands::Scan { dir, game } => app.cmd_scan(&dir, game).await?,
        Commands::Hash { path } => app.cmd_hash(&path).await?,
        Commands::Updates { paths, restore } => app.cmd_updates(&paths, restore).await?,
        Commands::Catalogue { action } => match action {
            CatalogueCommands::Refresh => app.cmd_catalogue_refresh().await?,
        },
    }

    Ok(())
}

//! tunegrab - download music with embedded metadata

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tunegrab::config::Settings;

mod cli;

use cli::commands::{self, Target};
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for relay messages
    let filter = if cli.verbose {
        "tunegrab=debug,reqwest=debug"
    } else {
        "tunegrab=info"
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    let settings = cli.apply_overrides(settings);

    let target = match cli.command {
        Commands::Track { track_id } => Target::Track(track_id),
        Commands::Album { album_id } => Target::Album(album_id),
        Commands::Playlist { owner, kind } => Target::Playlist { owner, kind },
        Commands::Artist { artist_id } => Target::Artist(artist_id),
        Commands::Serve => {
            return commands::serve(commands::build_orchestrator(settings)?).await;
        }
        Commands::Completion { shell } => {
            commands::completion(shell);
            return Ok(());
        }
    };

    commands::download(commands::build_orchestrator(settings)?, target).await
}

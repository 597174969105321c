//! CLI command handlers

use anyhow::{Context, Result};
use clap_complete::generate;
use colored::Colorize;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tracing::info;

use super::progress::{DownloadProgress, Tally};
use tunegrab::catalog::HttpCatalogClient;
use tunegrab::config::Settings;
use tunegrab::download::{
    BatchSummary, CompletionPipeline, DownloadManager, HttpFetcher, Orchestrator,
};
use tunegrab::relay::{self, CommandHandler};
use tunegrab::storage::FsStorage;

/// How long a stalled audio stream may sit without data
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// What a download command asked for
#[derive(Debug, Clone)]
pub enum Target {
    Track(String),
    Album(String),
    Playlist { owner: String, kind: String },
    Artist(String),
}

/// Wire the catalog, manager and completion pipeline from settings
pub fn build_orchestrator(settings: Settings) -> Result<Orchestrator> {
    let catalog = Arc::new(
        HttpCatalogClient::new(&settings.catalog_url).context("Failed to create catalog client")?,
    );
    let working_dir = std::env::current_dir().context("Failed to determine working directory")?;
    let storage = Arc::new(FsStorage::new(working_dir));
    let fetcher = Arc::new(HttpFetcher::new(READ_TIMEOUT).context("Failed to create HTTP client")?);
    let pipeline = Arc::new(CompletionPipeline::new(
        catalog.clone(),
        storage,
        settings.cover_size,
    ));

    let manager = DownloadManager::new(settings.concurrency, fetcher, pipeline);
    info!(
        "Downloading to {} with {} parallel downloads",
        settings.output_path.display(),
        manager.concurrency()
    );

    Ok(Orchestrator::new(catalog, manager, settings))
}

/// Handle the `track` / `album` / `playlist` / `artist` commands
pub async fn download(orchestrator: Orchestrator, target: Target) -> Result<()> {
    let manager = orchestrator.manager().clone();
    let events = manager.bus().subscribe_all();
    let subscription = events.id;
    let ui = tokio::spawn(DownloadProgress::new().run(events));

    println!("{}", "Resolving from catalog...".cyan());
    let resolved = match &target {
        Target::Track(id) => orchestrator.download_track(id).await,
        Target::Album(id) => orchestrator.download_album(id).await,
        Target::Playlist { owner, kind } => orchestrator.download_playlist(owner, kind).await,
        Target::Artist(id) => orchestrator.download_artist(id).await,
    };

    // Let the item bars settle even when resolution failed part way
    manager.wait_idle().await;
    manager.bus().unsubscribe(subscription);
    let tally = ui.await.context("Progress display task failed")?;

    let summary = resolved.with_context(|| format!("Failed to resolve {:?}", target))?;
    print_summary(&summary, &tally);

    if tally.failed > 0 || tally.errors > 0 {
        anyhow::bail!("{} download(s) failed", tally.failed + tally.errors);
    }
    Ok(())
}

fn print_summary(summary: &BatchSummary, tally: &Tally) {
    println!();
    println!("{}", "Download complete!".green().bold());
    println!("  Queued: {}", summary.enqueued.len());
    println!("  Completed: {}", tally.completed);
    if summary.skipped > 0 {
        println!("  Skipped (unavailable): {}", summary.skipped.to_string().yellow());
    }
    if tally.interrupted > 0 {
        println!("  Interrupted: {}", tally.interrupted.to_string().yellow());
    }
    if tally.failed + tally.errors > 0 {
        println!("  Failed: {}", (tally.failed + tally.errors).to_string().red());
    }
}

/// Handle the `serve` command
pub async fn serve(orchestrator: Orchestrator) -> Result<()> {
    let input = BufReader::new(tokio::io::stdin());
    let mut output = tokio::io::stdout();
    relay::serve(CommandHandler::new(orchestrator), input, &mut output).await
}

/// Handle the `completion` command
pub fn completion(shell: clap_complete::Shell) {
    let mut cmd = <super::Cli as clap::CommandFactory>::command();
    generate(shell, &mut cmd, "tunegrab", &mut io::stdout());
}

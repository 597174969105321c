//! JSON-lines relay between the download manager and an external UI
//!
//! Commands are read one per line from the input; every bus event and every
//! command reply is written as one JSON line to the output. Download commands
//! resolve in the background so a slow catalog never stalls the reader.
//! Once an item's terminal event has been written its snapshot is released
//! from the manager.

mod protocol;

pub use protocol::{Command, DownloadEventType, Message};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::download::{BatchSummary, DownloadManager, Event, Orchestrator};
use crate::error::CatalogError;

/// Executes relay commands against an orchestrator
#[derive(Clone)]
pub struct CommandHandler {
    orchestrator: Orchestrator,
}

impl CommandHandler {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    /// Run one command, returning the reply to send back, if any
    ///
    /// Download commands never reply directly: their progress arrives as bus
    /// events, and a batch-level failure is published as a process error.
    pub async fn handle(&self, command: Command) -> Option<Message> {
        debug!(?command, "Handling command");
        let orchestrator = &self.orchestrator;

        let batch = match command {
            Command::DownloadTrack { track_id } => orchestrator.download_track(&track_id).await,
            Command::DownloadAlbum { album_id } => orchestrator.download_album(&album_id).await,
            Command::DownloadPlaylist { owner, kind } => {
                orchestrator.download_playlist(&owner, &kind).await
            }
            Command::DownloadArtist { artist_id } => {
                orchestrator.download_artist(&artist_id).await
            }
            Command::ListDownloadItems => {
                return Some(Message::DownloadItems {
                    items: orchestrator.manager().list(),
                });
            }
            Command::InterruptDownload { download_item_id } => {
                orchestrator.manager().interrupt(download_item_id);
                return None;
            }
        };

        self.report_batch(batch);
        None
    }

    fn report_batch(&self, batch: Result<BatchSummary, CatalogError>) {
        match batch {
            Ok(summary) => debug!(
                enqueued = summary.enqueued.len(),
                skipped = summary.skipped,
                failed = summary.failed,
                "Batch resolved"
            ),
            Err(e) => {
                warn!("Batch failed: {}", e);
                self.orchestrator
                    .manager()
                    .bus()
                    .publish_process_error(e.to_string());
            }
        }
    }
}

/// Serve commands from `input` until it closes and every download has settled
pub async fn serve<R, W>(handler: CommandHandler, input: R, output: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let manager = handler.orchestrator.manager().clone();
    let mut events = manager.bus().subscribe_all();
    let mut lines = input.lines();
    let mut pending: JoinSet<Option<Message>> = JoinSet::new();
    let mut input_open = true;

    info!("Relay started");

    loop {
        tokio::select! {
            line = lines.next_line(), if input_open => {
                let Some(line) = line.context("Failed to read command")? else {
                    debug!("Input closed, waiting for downloads to settle");
                    input_open = false;
                    continue;
                };

                if line.trim().is_empty() {
                    continue;
                }

                match serde_json::from_str::<Command>(&line) {
                    Ok(command) => {
                        let handler = handler.clone();
                        pending.spawn(async move { handler.handle(command).await });
                    }
                    Err(e) => {
                        warn!("Rejected command: {}", e);
                        write_message(output, &Message::error(format!("invalid command: {e}"))).await?;
                    }
                }
            }

            Some(joined) = pending.join_next() => {
                match joined {
                    Ok(Some(reply)) => write_message(output, &reply).await?,
                    Ok(None) => {}
                    Err(e) => write_message(output, &Message::error(format!("command failed: {e}"))).await?,
                }
            }

            Some(event) = events.recv() => relay_event(output, &manager, event).await?,

            () = manager.wait_idle(), if !input_open && pending.is_empty() => break,
        }
    }

    manager.bus().unsubscribe(events.id);
    while let Some(event) = events.recv().await {
        relay_event(output, &manager, event).await?;
    }

    info!("Relay stopped");
    Ok(())
}

/// Write one bus event; a settled item is released once reported
async fn relay_event<W: AsyncWrite + Unpin>(
    output: &mut W,
    manager: &DownloadManager,
    event: Event,
) -> Result<()> {
    let settled = event
        .item()
        .filter(|_| event.is_terminal())
        .map(|item| item.id);
    write_message(output, &Message::from(event)).await?;
    if let Some(id) = settled {
        manager.release(id);
    }
    Ok(())
}

async fn write_message<W: AsyncWrite + Unpin>(output: &mut W, message: &Message) -> Result<()> {
    let mut line = serde_json::to_vec(message).context("Failed to encode message")?;
    line.push(b'\n');
    output
        .write_all(&line)
        .await
        .context("Failed to write message")?;
    output.flush().await.context("Failed to flush output")?;
    Ok(())
}

//! Terminal progress display driven by download events

use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use tunegrab::download::{DownloadId, DownloadItem, DownloadState, Event, Subscription};

/// Final counts shown after a run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub completed: usize,
    pub failed: usize,
    pub interrupted: usize,
    pub errors: usize,
}

/// One progress bar per download item
pub struct DownloadProgress {
    multi: MultiProgress,
    bars: HashMap<DownloadId, ProgressBar>,
    tally: Tally,
}

impl DownloadProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: HashMap::new(),
            tally: Tally::default(),
        }
    }

    /// Render events until the subscription ends
    pub async fn run(mut self, mut events: Subscription) -> Tally {
        while let Some(event) = events.recv().await {
            self.handle(event);
        }
        self.tally
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Added(item) => {
                let bar = self.multi.add(ProgressBar::new(0));
                bar.set_style(bar_style());
                bar.set_message(item.title.clone());
                self.bars.insert(item.id, bar);
            }
            Event::Progress(item) => {
                if let Some(bar) = self.bars.get(&item.id) {
                    if let Some(total) = item.progress.total {
                        bar.set_length(total);
                    }
                    bar.set_position(item.progress.received);
                }
            }
            Event::Completed(item) => {
                self.tally.completed += 1;
                self.finish(&item, format!("{} {}", "done".green(), item.title));
            }
            Event::Failed { item, error } => {
                self.tally.failed += 1;
                self.finish(&item, format!("{} {}: {}", "failed".red(), item.title, error));
            }
            Event::Interrupted(item) => {
                self.tally.interrupted += 1;
                self.finish(&item, format!("{} {}", "interrupted".yellow(), item.title));
            }
            Event::ProcessError { error } => {
                self.tally.errors += 1;
                let _ = self.multi.println(format!("{} {}", "error:".red().bold(), error));
            }
        }
    }

    /// Settle the item's bar; only completed items get a full bar
    fn finish(&mut self, item: &DownloadItem, message: String) {
        let Some(bar) = self.bars.remove(&item.id) else {
            let _ = self.multi.println(message);
            return;
        };
        if item.state == DownloadState::Complete {
            bar.finish_with_message(message);
        } else {
            bar.abandon_with_message(message);
        }
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

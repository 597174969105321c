//! Bounded-concurrency download scheduler
//!
//! The manager owns a FIFO queue of [`DownloadItem`]s and admits at most
//! `concurrency` of them at a time. Each admitted item runs as its own tokio
//! task: fetch the bytes, hand them to the [`CompletionHandler`], then report
//! back. All shared state (queue, active set, finished snapshots) sits behind
//! one mutex, and events are published while that mutex is held. So for any
//! subscriber:
//! - `add` for an item is seen before anything else about it
//! - no `progress` for an item is seen after its `interrupted`
//! - a freed slot is refilled before any later enqueue is processed

use async_trait::async_trait;
use bytes::Bytes;
use futures::FutureExt;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::events::{Event, EventBus};
use super::fetch::{Fetcher, ProgressSink};
use super::item::{DownloadId, DownloadItem, DownloadRequest, DownloadState};
use crate::error::{DownloadError, EnqueueError};

/// Terminal snapshots kept for `list`; the oldest are dropped beyond this
pub const FINISHED_RETENTION: usize = 256;

/// Work done on an item after its bytes have been fetched
#[async_trait]
pub trait CompletionHandler: Send + Sync {
    /// Tag and persist a fetched track; an error fails the item
    async fn complete(&self, item: &DownloadItem, audio: Bytes) -> Result<(), DownloadError>;
}

/// Download scheduler; clones share the same queue
#[derive(Clone)]
pub struct DownloadManager {
    shared: Arc<Shared>,
}

struct Shared {
    concurrency: usize,
    fetcher: Arc<dyn Fetcher>,
    completion: Arc<dyn CompletionHandler>,
    bus: EventBus,
    runtime: Handle,
    state: Mutex<QueueState>,
    /// Number of queued + active items
    live: watch::Sender<usize>,
}

#[derive(Default)]
struct QueueState {
    next_id: u64,
    queued: VecDeque<DownloadItem>,
    active: HashMap<DownloadId, ActiveDownload>,
    finished: VecDeque<DownloadItem>,
}

struct ActiveDownload {
    item: DownloadItem,
    cancel_token: CancellationToken,
}

impl QueueState {
    fn live_count(&self) -> usize {
        self.queued.len() + self.active.len()
    }

    fn retire(&mut self, item: DownloadItem) {
        self.finished.push_back(item);
        while self.finished.len() > FINISHED_RETENTION {
            self.finished.pop_front();
        }
    }
}

impl DownloadManager {
    /// Create a manager on the current tokio runtime
    ///
    /// `concurrency` is clamped to at least 1.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn new(
        concurrency: usize,
        fetcher: Arc<dyn Fetcher>,
        completion: Arc<dyn CompletionHandler>,
    ) -> Self {
        let (live, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                concurrency: concurrency.max(1),
                fetcher,
                completion,
                bus: EventBus::new(),
                runtime: Handle::current(),
                state: Mutex::new(QueueState::default()),
                live,
            }),
        }
    }

    /// Event bus owned by this manager
    pub fn bus(&self) -> &EventBus {
        &self.shared.bus
    }

    pub fn concurrency(&self) -> usize {
        self.shared.concurrency
    }

    /// Queue a download and return its id
    ///
    /// Emits `add`, then immediately admits queued items into free slots. Never
    /// waits on a transfer; failures of the transfer itself are reported as
    /// `error` events, only an invalid request is rejected here.
    pub fn enqueue(&self, request: DownloadRequest) -> Result<DownloadId, EnqueueError> {
        request.validate()?;

        let mut state = self.shared.lock();
        state.next_id += 1;
        let id = DownloadId(state.next_id);
        let item = DownloadItem::new(id, request);

        info!(download_id = id.0, title = %item.title, "Download queued");
        self.shared.bus.publish(Event::Added(item.clone()));
        state.queued.push_back(item);

        self.shared.admit(&mut state);
        self.shared.update_live(&state);
        Ok(id)
    }

    /// Interrupt a download
    ///
    /// A queued item is dropped silently. An active item is cancelled, moves to
    /// `Interrupted`, emits `interrupted` and frees its slot. Terminal or
    /// unknown ids are a no-op. Returns whether anything happened.
    pub fn interrupt(&self, id: DownloadId) -> bool {
        let mut state = self.shared.lock();

        if let Some(pos) = state.queued.iter().position(|item| item.id == id) {
            state.queued.remove(pos);
            info!(download_id = id.0, "Queued download removed");
            self.shared.update_live(&state);
            return true;
        }

        let Some(active) = state.active.remove(&id) else {
            debug!(download_id = id.0, "Interrupt ignored, download not running");
            return false;
        };

        active.cancel_token.cancel();
        let mut item = active.item;
        item.advance(DownloadState::Interrupted);
        info!(download_id = id.0, "Download interrupted");
        self.shared.bus.publish(Event::Interrupted(item.clone()));
        state.retire(item);

        self.shared.admit(&mut state);
        self.shared.update_live(&state);
        true
    }

    /// Snapshot of every known item, ordered by id
    pub fn list(&self) -> Vec<DownloadItem> {
        let state = self.shared.lock();
        let mut items: Vec<DownloadItem> = state
            .queued
            .iter()
            .chain(state.active.values().map(|a| &a.item))
            .chain(state.finished.iter())
            .cloned()
            .collect();
        items.sort_by_key(|item| item.id);
        items
    }

    /// Snapshot of a single item
    pub fn get(&self, id: DownloadId) -> Option<DownloadItem> {
        let state = self.shared.lock();
        state
            .queued
            .iter()
            .chain(state.active.get(&id).map(|a| &a.item))
            .chain(state.finished.iter())
            .find(|item| item.id == id)
            .cloned()
    }

    /// Number of items currently `Active`
    pub fn active_count(&self) -> usize {
        self.shared.lock().active.len()
    }

    /// Forget one terminal item once its outcome has been reported
    ///
    /// Queued and active items are left alone. Returns whether a snapshot was
    /// dropped.
    pub fn release(&self, id: DownloadId) -> bool {
        let mut state = self.shared.lock();
        match state.finished.iter().position(|item| item.id == id) {
            Some(pos) => {
                state.finished.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Forget terminal items; returns how many were dropped
    pub fn clear_finished(&self) -> usize {
        let mut state = self.shared.lock();
        let count = state.finished.len();
        state.finished.clear();
        count
    }

    /// Wait until nothing is queued or active
    pub async fn wait_idle(&self) {
        let mut live = self.shared.live.subscribe();
        // The sender lives as long as `self`, so this only ends once idle
        let _ = live.wait_for(|count| *count == 0).await;
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update_live(&self, state: &QueueState) {
        self.live.send_replace(state.live_count());
    }

    /// Fill free slots from the head of the queue
    fn admit(self: &Arc<Self>, state: &mut QueueState) {
        while state.active.len() < self.concurrency {
            let Some(mut item) = state.queued.pop_front() else {
                break;
            };

            item.advance(DownloadState::Active);
            let cancel_token = CancellationToken::new();
            info!(
                download_id = item.id.0,
                active = state.active.len() + 1,
                "Download started"
            );

            self.spawn_transfer(item.clone(), cancel_token.clone());
            state.active.insert(item.id, ActiveDownload { item, cancel_token });
        }
    }

    fn spawn_transfer(self: &Arc<Self>, item: DownloadItem, cancel_token: CancellationToken) {
        let shared = Arc::clone(self);
        self.runtime.spawn(async move {
            let progress = ItemProgress {
                shared: Arc::clone(&shared),
                id: item.id,
            };

            let transfer = AssertUnwindSafe(shared.transfer(&item, &progress)).catch_unwind();
            let outcome = tokio::select! {
                biased;
                () = cancel_token.cancelled() => Err(DownloadError::Cancelled),
                result = transfer => result.unwrap_or_else(|panic| Err(panic_error(panic))),
            };

            shared.finish(item.id, outcome);
        });
    }

    async fn transfer(
        &self,
        item: &DownloadItem,
        progress: &ItemProgress,
    ) -> Result<(), DownloadError> {
        let audio = self.fetcher.fetch(&item.source_url, progress).await?;
        debug!(download_id = item.id.0, bytes = audio.len(), "Fetched, running completion");
        self.completion.complete(item, audio).await
    }

    /// Settle a finished transfer and refill its slot
    fn finish(self: &Arc<Self>, id: DownloadId, outcome: Result<(), DownloadError>) {
        let mut state = self.lock();

        // Already settled by `interrupt`
        let Some(active) = state.active.remove(&id) else {
            debug!(download_id = id.0, "Transfer ended after interrupt");
            return;
        };

        let mut item = active.item;
        match outcome {
            Ok(()) => {
                item.advance(DownloadState::Complete);
                info!(download_id = id.0, "Download complete");
                self.bus.publish(Event::Completed(item.clone()));
            }
            Err(DownloadError::Cancelled) => {
                item.advance(DownloadState::Interrupted);
                warn!(download_id = id.0, "Download interrupted by transport");
                self.bus.publish(Event::Interrupted(item.clone()));
            }
            Err(e) => {
                let message = e.to_string();
                item.advance(DownloadState::Error);
                item.error = Some(message.clone());
                error!(download_id = id.0, error = %message, "Download failed");
                self.bus.publish(Event::Failed {
                    item: item.clone(),
                    error: message,
                });
            }
        }
        state.retire(item);

        self.admit(&mut state);
        self.update_live(&state);
    }
}

/// Progress reporter bound to one item
struct ItemProgress {
    shared: Arc<Shared>,
    id: DownloadId,
}

impl ProgressSink for ItemProgress {
    fn report(&self, received: u64, total: Option<u64>) {
        let mut state = self.shared.lock();
        // Interrupted items are no longer in the active set
        if let Some(active) = state.active.get_mut(&self.id) {
            if active.item.record_progress(received, total) {
                self.shared.bus.publish(Event::Progress(active.item.clone()));
            }
        }
    }
}

fn panic_error(panic: Box<dyn std::any::Any + Send>) -> DownloadError {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "transfer task panicked".to_string());
    DownloadError::unknown(message)
}

//! Download manager: queue, lifecycle events, completion pipeline
//!
//! This module contains:
//! - `item`: download items and their state machine
//! - `events`: typed event bus owned by the manager
//! - `fetch`: audio transport
//! - `manager`: bounded-concurrency scheduler
//! - `pipeline`: tagging + storage after a successful fetch
//! - `orchestrator`: catalog entities to download requests

pub mod events;
pub mod fetch;
pub mod item;
pub mod manager;
pub mod orchestrator;
pub mod pipeline;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use events::{Event, EventBus, Subscription, SubscriptionId, Topic};
pub use fetch::{Fetcher, HttpFetcher, ProgressSink};
pub use item::{DownloadId, DownloadItem, DownloadRequest, DownloadState, Progress};
pub use manager::{CompletionHandler, DownloadManager, FINISHED_RETENTION};
pub use orchestrator::{BatchSummary, Orchestrator};
pub use pipeline::{track_tags, CompletionPipeline};

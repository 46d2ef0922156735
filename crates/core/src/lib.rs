//! Client-side task orchestration for a media acquisition pipeline.
//!
//! A backend service does the heavy lifting (keyword crawling, media
//! downloads, speech transcription, LLM summarization) behind a stateless
//! HTTP API. This crate tracks the lifecycle of those server-executed jobs
//! and reconciles what it learns about each media item into one persisted
//! catalog:
//!
//! - [`poller::StatusPoller`] drives one ordered status-request loop per job
//! - [`tracker::TaskTracker`] owns observable task state
//! - [`queue::TranscriptionQueue`] serializes transcriptions, one at a time
//! - [`crawl::CrawlSession`] controls the backend's crawler singleton
//! - [`catalog::CatalogStore`] merges item facts monotonically and persists
//! - [`batch::BatchCoordinator`] fans actions out over a selection
//! - [`deck::MediaDeck`] wires it all together
pub mod backend;
pub mod batch;
pub mod catalog;
pub mod config;
pub mod crawl;
pub mod deck;
pub mod poller;
pub mod queue;
pub mod testing;
pub mod tracker;

pub use backend::{BackendClient, BackendError, HttpBackend};
pub use config::Config;
pub use deck::MediaDeck;

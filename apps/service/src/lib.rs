//! Survey Tool fleet watcher.
//!
//! Polls every configured Survey Tool server and its host, tracks up/down
//! state with a probation period, keeps a history of observations and tells
//! people when a server goes down or comes back.

pub mod api;
pub mod config;
pub mod database;
pub mod events;
pub mod monitoring;
pub mod notify;
pub mod orchestrator;
pub mod pool;
pub mod registry;
pub mod tracker;

pub use api::{HistoryResponse, LatestResponse, Snapshot, WatcherHandle};
pub use config::Config;
pub use orchestrator::Watcher;

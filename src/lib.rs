//! Live git branch tracking and unified-diff statistics for terminal dashboards.

pub mod app;
pub mod backend;
pub mod error;
pub mod event;
pub mod models;
pub mod system;
pub mod ui;
pub mod watcher;

pub use error::WatchError;
pub use models::{BranchUpdate, DiffFileStats, DiffStatsResult};
pub use system::git::{parse_diff_stats, parse_diff_stats_reader};
pub use watcher::{watch_branch, BranchFeed, BranchWatcher, WatcherConfig, WatcherHandle};

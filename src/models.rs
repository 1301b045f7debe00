use std::collections::HashMap;

use chrono::{DateTime, Local};
use serde::Serialize;

/// Line counts for a single file in a unified diff.
/// `modified` is always `added + removed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffFileStats {
    pub added: u32,
    pub removed: u32,
    pub modified: u32,
}

/// Per-file diff stats keyed by path (with the `b/` prefix stripped).
pub type DiffStatsResult = HashMap<String, DiffFileStats>;

/// Sum of `added` across all files.
pub fn total_added(stats: &DiffStatsResult) -> u32 {
    stats.values().map(|s| s.added).sum()
}

/// Sum of `removed` across all files.
pub fn total_removed(stats: &DiffStatsResult) -> u32 {
    stats.values().map(|s| s.removed).sum()
}

/// Entries ordered by path, for stable display.
pub fn sorted_entries(stats: &DiffStatsResult) -> Vec<(&str, DiffFileStats)> {
    let mut entries: Vec<(&str, DiffFileStats)> =
        stats.iter().map(|(path, s)| (path.as_str(), *s)).collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

/// Notification pushed from a branch watcher to its host.
/// An empty `branch` means detached HEAD, or the watcher shutting down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchUpdate {
    pub branch: String,
    pub at: DateTime<Local>,
}

impl BranchUpdate {
    pub fn now(branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            at: Local::now(),
        }
    }
}

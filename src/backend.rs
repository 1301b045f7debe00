use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::app::{BackendCommand, StateSnapshot};
use crate::models::{BranchUpdate, DiffStatsResult};
use crate::system::git;
use crate::watcher::{BranchFeed, WatcherHandle};

/// How often the working tree diff is recomputed when nothing else asks for it.
pub const DIFF_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

const DIFF_FAILED: &str = "git diff failed";

/// The backend actor runs in `tokio::spawn` and owns all I/O state:
/// the branch feed and the periodic `git diff`.
pub struct Backend {
    cwd: PathBuf,
    diff_interval: Duration,

    branch: String,
    branch_updated_at: Option<DateTime<Local>>,
    diff_stats: DiffStatsResult,
    status_message: Option<String>,

    branch_rx: Option<mpsc::UnboundedReceiver<BranchUpdate>>,
    watcher: Option<WatcherHandle>,
    state_tx: watch::Sender<Arc<StateSnapshot>>,
}

impl Backend {
    pub fn new(
        cwd: PathBuf,
        feed: BranchFeed,
        state_tx: watch::Sender<Arc<StateSnapshot>>,
        diff_interval: Duration,
    ) -> Self {
        let BranchFeed {
            initial,
            updates,
            handle,
        } = feed;
        let status_message = if handle.is_none() {
            Some("Live branch tracking unavailable".to_string())
        } else {
            None
        };
        Self {
            cwd,
            diff_interval,
            branch: initial,
            branch_updated_at: Some(Local::now()),
            diff_stats: DiffStatsResult::new(),
            status_message,
            branch_rx: handle.is_some().then_some(updates),
            watcher: handle,
            state_tx,
        }
    }

    /// Run the backend event loop until `Quit` or the UI goes away.
    pub async fn run(mut self, mut cmd_rx: mpsc::Receiver<BackendCommand>) {
        self.send_snapshot();

        let mut diff_tick = tokio::time::interval(self.diff_interval);
        diff_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(BackendCommand::RefreshDiff) => {
                        self.refresh_diff().await;
                        self.send_snapshot();
                    }
                    Some(BackendCommand::Quit) | None => break,
                },
                update = async {
                    match self.branch_rx.as_mut() {
                        Some(rx) => rx.recv().await,
                        None => std::future::pending().await,
                    }
                } => {
                    match update {
                        Some(update) => {
                            self.apply_branch_update(update);
                            self.refresh_diff().await;
                        }
                        None => {
                            debug!("branch feed closed");
                            self.branch_rx = None;
                            self.watcher = None;
                        }
                    }
                    self.send_snapshot();
                }
                _ = diff_tick.tick() => {
                    self.refresh_diff().await;
                    self.send_snapshot();
                }
            }
        }

        if let Some(watcher) = self.watcher.take() {
            watcher.shutdown().await;
        }
    }

    fn apply_branch_update(&mut self, update: BranchUpdate) {
        debug!("branch update: {:?}", update.branch);
        self.branch = update.branch;
        self.branch_updated_at = Some(update.at);
    }

    async fn refresh_diff(&mut self) {
        match git::working_tree_diff_stats(&self.cwd).await {
            Ok(stats) => {
                self.diff_stats = stats;
                if self.status_message.as_deref() == Some(DIFF_FAILED) {
                    self.status_message = None;
                }
            }
            Err(e) => {
                warn!("diff refresh failed: {e:#}");
                self.status_message = Some(DIFF_FAILED.to_string());
            }
        }
    }

    fn send_snapshot(&self) {
        let snapshot = StateSnapshot {
            branch: self.branch.clone(),
            branch_updated_at: self.branch_updated_at,
            live: self.branch_rx.is_some(),
            diff_stats: self.diff_stats.clone(),
            status_message: self.status_message.clone(),
        };
        self.state_tx.send_replace(Arc::new(snapshot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_secs(3);

    fn offline_feed(initial: &str) -> BranchFeed {
        let (_tx, updates) = mpsc::unbounded_channel();
        BranchFeed {
            initial: initial.to_string(),
            updates,
            handle: None,
        }
    }

    async fn wait_for<F>(rx: &mut watch::Receiver<Arc<StateSnapshot>>, pred: F) -> Arc<StateSnapshot>
    where
        F: Fn(&StateSnapshot) -> bool,
    {
        tokio::time::timeout(WAIT, async {
            loop {
                {
                    let snapshot = rx.borrow_and_update().clone();
                    if pred(&snapshot) {
                        return snapshot;
                    }
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .expect("snapshot condition not reached")
    }

    #[tokio::test]
    async fn snapshot_only_feed_is_not_live() {
        let dir = tempfile::tempdir().unwrap();
        let (state_tx, mut state_rx) = watch::channel(Arc::new(StateSnapshot::default()));
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let backend = Backend::new(
            dir.path().to_path_buf(),
            offline_feed("main"),
            state_tx,
            Duration::from_secs(60),
        );
        let task = tokio::spawn(backend.run(cmd_rx));

        let snapshot = wait_for(&mut state_rx, |s| s.branch == "main").await;
        assert!(!snapshot.live);
        // Either the offline notice or the failed diff outside a repo.
        assert!(snapshot.status_message.is_some());

        cmd_tx.send(BackendCommand::Quit).await.unwrap();
        tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn branch_updates_reach_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let (state_tx, mut state_rx) = watch::channel(Arc::new(StateSnapshot::default()));
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (branch_tx, branch_rx) = mpsc::unbounded_channel();

        let mut backend = Backend::new(
            dir.path().to_path_buf(),
            offline_feed("main"),
            state_tx,
            Duration::from_secs(60),
        );
        backend.branch_rx = Some(branch_rx);
        let task = tokio::spawn(backend.run(cmd_rx));

        let snapshot = wait_for(&mut state_rx, |s| s.branch == "main").await;
        assert!(snapshot.live);

        branch_tx.send(BranchUpdate::now("feature/x")).unwrap();
        wait_for(&mut state_rx, |s| s.branch == "feature/x").await;

        drop(branch_tx);
        wait_for(&mut state_rx, |s| !s.live).await;

        cmd_tx.send(BackendCommand::Quit).await.unwrap();
        tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn dropped_ui_stops_backend() {
        let dir = tempfile::tempdir().unwrap();
        let (state_tx, _state_rx) = watch::channel(Arc::new(StateSnapshot::default()));
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let backend = Backend::new(
            dir.path().to_path_buf(),
            offline_feed(""),
            state_tx,
            Duration::from_secs(60),
        );
        let task = tokio::spawn(backend.run(cmd_rx));
        drop(cmd_tx);
        tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn diff_failure_sets_status_message() {
        let dir = tempfile::tempdir().unwrap();
        let (state_tx, _state_rx) = watch::channel(Arc::new(StateSnapshot::default()));
        let mut backend = Backend::new(
            dir.path().to_path_buf(),
            offline_feed(""),
            state_tx,
            Duration::from_secs(60),
        );
        backend.refresh_diff().await;
        assert_eq!(backend.status_message.as_deref(), Some(DIFF_FAILED));
        assert!(backend.diff_stats.is_empty());
    }
}

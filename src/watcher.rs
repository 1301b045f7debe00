//! Live branch tracking.
//!
//! A [`BranchWatcher`] tracks `.git/HEAD` and the ref file HEAD points at. Git
//! replaces both by renaming a lock file over them, so the watcher subscribes
//! to their parent directories and keeps only events for the tracked files.
//! It re-reads HEAD whenever one of them is written or replaced, and pushes
//! [`BranchUpdate`]s to the host over an unbounded channel so the host loop
//! never blocks the watcher. Updates closer together than the debounce window
//! are dropped. Cancellation produces one final update with an empty branch.

pub mod head;
pub mod watch_set;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::WatchError;
use crate::models::BranchUpdate;
use crate::system::git;

use head::{head_file, locate_git_dir, read_head, GIT_DIR, HEAD_FILE};
pub use head::HeadTarget;
pub use watch_set::{FsEvent, FsOp, WatchBackend, WatchSet};

/// Minimum time between two emitted updates.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Stream of raw filesystem notifications consumed by the event loop.
pub type FsEventReceiver = mpsc::UnboundedReceiver<Result<FsEvent, WatchError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherConfig {
    pub debounce: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

/// Branch name plus the instant it was last emitted to the host.
#[derive(Debug, Clone, Default)]
pub struct BranchState {
    pub current_branch: String,
    pub last_update: Option<Instant>,
}

pub struct BranchWatcher<B: WatchBackend> {
    worktree: PathBuf,
    git_dir: PathBuf,
    head_file: PathBuf,
    ref_file: PathBuf,
    /// Files whose changes trigger a HEAD re-read.
    targets: Vec<PathBuf>,
    state: BranchState,
    subscriptions: WatchSet<B>,
    debounce: Duration,
    updates: mpsc::UnboundedSender<BranchUpdate>,
}

impl<B: WatchBackend> BranchWatcher<B> {
    /// Resolve HEAD for `cwd` and subscribe to it.
    ///
    /// The ref file HEAD points at is tracked too when it exists; failing
    /// to do so is not an error (packed refs have no loose file).
    pub fn init(
        cwd: &Path,
        backend: B,
        config: WatcherConfig,
        updates: mpsc::UnboundedSender<BranchUpdate>,
    ) -> Result<Self, WatchError> {
        let git_dir = locate_git_dir(cwd)?;
        let head_file = head_file(&git_dir);
        let target = read_head(&git_dir)?;

        let mut watcher = Self {
            worktree: cwd.to_path_buf(),
            git_dir,
            head_file: head_file.clone(),
            ref_file: target.ref_file.clone(),
            targets: Vec::new(),
            state: BranchState {
                current_branch: target.branch,
                last_update: None,
            },
            subscriptions: WatchSet::new(backend),
            debounce: config.debounce,
            updates,
        };

        watcher.track(&head_file)?;
        if target.ref_file != head_file && target.ref_file.exists() {
            if let Err(e) = watcher.track(&target.ref_file) {
                debug!("could not watch {}: {e}", target.ref_file.display());
            }
        }
        Ok(watcher)
    }

    pub fn current_branch(&self) -> &str {
        &self.state.current_branch
    }

    pub fn ref_file(&self) -> &Path {
        &self.ref_file
    }

    /// Directories currently subscribed to.
    pub fn watched_paths(&self) -> &[PathBuf] {
        self.subscriptions.paths()
    }

    /// Files whose changes are reported.
    pub fn tracked_files(&self) -> &[PathBuf] {
        &self.targets
    }

    /// Subscribe to the directory holding `file` and react to its changes.
    fn track(&mut self, file: &Path) -> Result<(), WatchError> {
        let dir = file.parent().unwrap_or(file);
        self.subscriptions.add(dir)?;
        if !self.targets.iter().any(|t| t == file) {
            self.targets.push(file.to_path_buf());
        }
        Ok(())
    }

    /// Watched directories also report lock files, the index and so on.
    /// Some backends report canonical paths, so fall back to matching the
    /// part below the working tree.
    fn is_tracked(&self, path: &Path) -> bool {
        self.targets.iter().any(|target| {
            path == target
                || target
                    .strip_prefix(&self.worktree)
                    .is_ok_and(|rel| path.ends_with(rel))
        })
    }

    /// Run the event loop on a background task.
    pub fn spawn(self, events: FsEventReceiver) -> WatcherHandle {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(events, cancel_rx));
        WatcherHandle {
            cancel: Some(cancel_tx),
            task,
        }
    }

    /// Process events until cancelled. Dropping the cancel sender counts as
    /// cancellation, as does the event source closing.
    pub async fn run(mut self, mut events: FsEventReceiver, mut cancel: oneshot::Receiver<()>) {
        loop {
            tokio::select! {
                biased;
                _ = &mut cancel => break,
                event = events.recv() => match event {
                    Some(Ok(event)) => self.handle_event(event),
                    Some(Err(e)) => warn!("branch watcher notification error: {e}"),
                    None => {
                        debug!("branch watcher event source closed");
                        break;
                    }
                },
            }
        }
        self.shutdown();
    }

    fn handle_event(&mut self, event: FsEvent) {
        if !matches!(event.op, FsOp::Write | FsOp::Create) || !self.is_tracked(&event.path) {
            return;
        }

        let target = match read_head(&self.git_dir) {
            Ok(target) => {
                self.state.current_branch.clone_from(&target.branch);
                Some(target)
            }
            Err(e) => {
                warn!("failed to re-read HEAD: {e}");
                None
            }
        };

        if let Some(last) = self.state.last_update {
            if last.elapsed() < self.debounce {
                debug!("debounced change on {}", event.path.display());
                return;
            }
        }

        if event.path.ends_with(Path::new(GIT_DIR).join(HEAD_FILE)) {
            if let Some(target) = target {
                self.follow_ref(target.ref_file);
            }
        }

        self.emit();
    }

    /// Track the ref file HEAD now points at. Older refs stay tracked; they
    /// only cause extra debounced events.
    fn follow_ref(&mut self, ref_file: PathBuf) {
        if ref_file == self.ref_file {
            return;
        }
        if ref_file != self.head_file {
            match self.track(&ref_file) {
                Ok(()) => debug!("now tracking {}", ref_file.display()),
                Err(e) => debug!("could not watch {}: {e}", ref_file.display()),
            }
        }
        self.ref_file = ref_file;
    }

    fn emit(&mut self) {
        let update = BranchUpdate::now(self.state.current_branch.as_str());
        if self.updates.send(update).is_err() {
            debug!("branch update dropped: host receiver gone");
        }
        self.state.last_update = Some(Instant::now());
    }

    fn shutdown(self) {
        let _ = self.updates.send(BranchUpdate::now(""));
        self.subscriptions.release();
    }
}

/// Handle to a running watcher task.
pub struct WatcherHandle {
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    /// Ask the watcher to stop. Calling this more than once is harmless.
    pub fn cancel(&mut self) {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
    }

    /// Cancel and wait for the task to release its watch handles.
    pub async fn shutdown(mut self) {
        self.cancel();
        if let Err(e) = self.task.await {
            warn!("branch watcher task failed: {e}");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Start a `notify`-backed watcher for `cwd`.
pub fn start(
    cwd: &Path,
    config: WatcherConfig,
) -> Result<(WatcherHandle, mpsc::UnboundedReceiver<BranchUpdate>), WatchError> {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let backend = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(event) => {
                for event in FsEvent::from_notify(event) {
                    let _ = event_tx.send(Ok(event));
                }
            }
            Err(e) => {
                let _ = event_tx.send(Err(WatchError::from(e)));
            }
        }
    })?;

    let (update_tx, update_rx) = mpsc::unbounded_channel();
    let watcher = BranchWatcher::init(cwd, backend, config, update_tx)?;
    Ok((watcher.spawn(event_rx), update_rx))
}

/// What a host gets from [`watch_branch`]: a starting value and, when the
/// watcher could be set up, a live stream of changes.
pub struct BranchFeed {
    pub initial: String,
    pub updates: mpsc::UnboundedReceiver<BranchUpdate>,
    pub handle: Option<WatcherHandle>,
}

impl BranchFeed {
    pub fn is_live(&self) -> bool {
        self.handle.is_some()
    }
}

/// Look up the current branch and try to start a live watcher.
/// Without a usable `.git` directory the feed carries the snapshot only and
/// its update channel is already closed.
pub async fn watch_branch(cwd: &Path, config: WatcherConfig) -> BranchFeed {
    let initial = git::current_branch(cwd).await;
    match start(cwd, config) {
        Ok((handle, updates)) => BranchFeed {
            initial,
            updates,
            handle: Some(handle),
        },
        Err(e) => {
            debug!("live branch updates unavailable: {e}");
            let (_tx, updates) = mpsc::unbounded_channel();
            BranchFeed {
                initial,
                updates,
                handle: None,
            }
        }
    }
}

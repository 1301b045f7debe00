use std::cell::{Ref, RefCell};
use std::sync::Arc;

use chrono::{DateTime, Local};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::text::Line;
use tokio::sync::{mpsc, watch};

use crate::models::DiffStatsResult;
use crate::ui::diff::build_diff_tree_lines;

/// Command from UI → Backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCommand {
    RefreshDiff,
    Quit,
}

/// Snapshot of backend state sent to UI for rendering.
/// Uses latest-value semantics via `watch` channel.
#[derive(Debug, Clone, Default)]
pub struct StateSnapshot {
    pub branch: String,
    pub branch_updated_at: Option<DateTime<Local>>,
    /// Whether branch changes are being tracked live or this is a one-off lookup.
    pub live: bool,
    pub diff_stats: DiffStatsResult,
    pub status_message: Option<String>,
}

/// UI-only application state, separated from I/O.
/// Receives state snapshots from the Backend actor via channels.
pub struct UiApp {
    pub snapshot: Arc<StateSnapshot>,
    pub diff_scroll: usize,
    pub should_quit: bool,
    pub needs_redraw: bool,

    /// Rendered diff tree for the last seen width; cleared on every new snapshot.
    diff_tree_cache: RefCell<(Option<usize>, Vec<Line<'static>>)>,

    cmd_tx: mpsc::Sender<BackendCommand>,
    state_rx: watch::Receiver<Arc<StateSnapshot>>,
}

impl UiApp {
    pub fn new(
        state_rx: watch::Receiver<Arc<StateSnapshot>>,
        cmd_tx: mpsc::Sender<BackendCommand>,
    ) -> Self {
        let snapshot = state_rx.borrow().clone();
        Self {
            snapshot,
            diff_scroll: 0,
            should_quit: false,
            needs_redraw: true,
            diff_tree_cache: RefCell::new((None, Vec::new())),
            cmd_tx,
            state_rx,
        }
    }

    /// Test constructor with dummy channels.
    #[cfg(test)]
    pub fn new_test() -> Self {
        let (cmd_tx, _cmd_rx) = mpsc::channel(1);
        let (_state_tx, state_rx) = watch::channel(Arc::new(StateSnapshot::default()));
        Self::new(state_rx, cmd_tx)
    }

    /// Poll for new state from the backend. Call once per tick.
    pub fn poll_state(&mut self) {
        if self.state_rx.has_changed().unwrap_or(false) {
            let snapshot = self.state_rx.borrow_and_update().clone();
            self.apply_snapshot(snapshot);
        }
    }

    pub fn apply_snapshot(&mut self, snapshot: Arc<StateSnapshot>) {
        self.snapshot = snapshot;
        *self.diff_tree_cache.borrow_mut() = (None, Vec::new());
        let max_scroll = self.snapshot.diff_stats.len().saturating_sub(1);
        self.diff_scroll = self.diff_scroll.min(max_scroll);
        self.needs_redraw = true;
    }

    /// Diff tree lines for the given panel width, rebuilt only when the
    /// snapshot or width changed.
    pub fn diff_lines(&self, width: usize) -> Ref<'_, Vec<Line<'static>>> {
        {
            let mut cache = self.diff_tree_cache.borrow_mut();
            if cache.0 != Some(width) {
                cache.1 = build_diff_tree_lines(&self.snapshot.diff_stats, width);
                cache.0 = Some(width);
            }
        }
        Ref::map(self.diff_tree_cache.borrow(), |cache| &cache.1)
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => self.quit(),
            KeyCode::Char('q') | KeyCode::Esc => self.quit(),
            KeyCode::Char('r') => {
                if self.cmd_tx.try_send(BackendCommand::RefreshDiff).is_err() {
                    tracing::debug!("refresh request dropped: backend busy");
                }
            }
            KeyCode::Char('j') | KeyCode::Down => {
                self.diff_scroll = self.diff_scroll.saturating_add(1);
                self.needs_redraw = true;
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.diff_scroll = self.diff_scroll.saturating_sub(1);
                self.needs_redraw = true;
            }
            KeyCode::Char('g') | KeyCode::Home => {
                self.diff_scroll = 0;
                self.needs_redraw = true;
            }
            _ => {}
        }
    }

    fn quit(&mut self) {
        let _ = self.cmd_tx.try_send(BackendCommand::Quit);
        self.should_quit = true;
    }
}

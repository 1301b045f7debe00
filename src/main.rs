use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use std::collections::BTreeMap;
use std::future::Future;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::EnvFilter;

use branchline::app::{StateSnapshot, UiApp};
use branchline::backend::{Backend, DIFF_REFRESH_INTERVAL};
use branchline::event::{Event, EventHandler};
use branchline::models::{sorted_entries, total_added, total_removed, BranchUpdate};
use branchline::system::git;
use branchline::watcher::{watch_branch, WatcherConfig, WatcherHandle, DEFAULT_DEBOUNCE};
use branchline::{parse_diff_stats, parse_diff_stats_reader, ui, DiffStatsResult};

const EVENT_TICK_RATE: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[command(name = "branchline", version, about = "Live git branch and diff stats dashboard")]
struct Cli {
    /// Minimum milliseconds between two branch notifications
    #[arg(long, global = true, default_value_t = DEFAULT_DEBOUNCE.as_millis() as u64)]
    debounce_ms: u64,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the current branch name
    Branch,
    /// Summarize a unified diff per file
    Diffstat {
        /// Read the diff from a file, or `-` for stdin (default: `git diff` of the working tree)
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Stream branch changes until interrupted
    Watch {
        /// Print each update as a JSON line
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.command.is_none());

    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let config = WatcherConfig {
        debounce: Duration::from_millis(cli.debounce_ms),
    };

    match cli.command {
        Some(Commands::Branch) => cmd_branch(&cwd).await,
        Some(Commands::Diffstat { input, json }) => cmd_diffstat(&cwd, input.as_deref(), json).await,
        Some(Commands::Watch { json }) => cmd_watch(&cwd, config, json).await,
        None => run_tui(cwd, config).await,
    }
}

/// Subcommands log to stderr; the TUI logs to a file so output cannot
/// corrupt the alternate screen.
fn init_logging(tui: bool) {
    if !tui {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .try_init();
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match open_log_file() {
        Ok(file) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        Err(_) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::sink)
                .try_init();
        }
    }
}

fn open_log_file() -> Result<std::fs::File> {
    let dir = dirs::cache_dir()
        .context("no cache directory")?
        .join("branchline");
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join("branchline.log");
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening {}", path.display()))
}

async fn cmd_branch(cwd: &Path) -> Result<()> {
    println!("{}", git::current_branch(cwd).await);
    Ok(())
}

async fn cmd_diffstat(cwd: &Path, input: Option<&Path>, json: bool) -> Result<()> {
    let stats = match input {
        Some(path) if path == Path::new("-") => {
            parse_diff_stats_reader(io::stdin().lock()).context("Failed to read diff from stdin")?
        }
        Some(path) => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            parse_diff_stats_reader(BufReader::new(file))
                .with_context(|| format!("Failed to read diff from {}", path.display()))?
        }
        None => parse_diff_stats(&git::working_tree_diff(cwd).await?),
    };

    if json {
        let ordered: BTreeMap<_, _> = stats.iter().collect();
        println!("{}", serde_json::to_string_pretty(&ordered)?);
    } else {
        print!("{}", format_diffstat(&stats));
    }
    Ok(())
}

fn format_diffstat(stats: &DiffStatsResult) -> String {
    let mut out = String::new();
    let entries = sorted_entries(stats);
    let width = entries.iter().map(|(p, _)| p.chars().count()).max().unwrap_or(0);
    for (path, s) in &entries {
        out.push_str(&format!(
            "{path:<width$}  +{} -{} ~{}\n",
            s.added, s.removed, s.modified
        ));
    }
    out.push_str(&format!(
        "{} file(s) changed, +{} -{}\n",
        entries.len(),
        total_added(stats),
        total_removed(stats)
    ));
    out
}

async fn cmd_watch(cwd: &Path, config: WatcherConfig, json: bool) -> Result<()> {
    let mut feed = watch_branch(cwd, config).await;
    let mut out = io::stdout();
    print_update(&mut out, &BranchUpdate::now(feed.initial.as_str()), json)?;

    let Some(handle) = feed.handle.take() else {
        eprintln!("live branch tracking unavailable (no .git directory here)");
        return Ok(());
    };

    let interrupted = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };
    forward_updates(&mut feed.updates, handle, interrupted, &mut out, json).await
}

/// Print updates until the feed closes. Once `stop` resolves the watcher is
/// cancelled, and its final empty-branch update is still printed.
async fn forward_updates<W: Write>(
    updates: &mut UnboundedReceiver<BranchUpdate>,
    mut handle: WatcherHandle,
    stop: impl Future<Output = ()>,
    out: &mut W,
    json: bool,
) -> Result<()> {
    tokio::pin!(stop);
    let mut stopping = false;

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(update) => print_update(out, &update, json)?,
                None => break,
            },
            _ = &mut stop, if !stopping => {
                handle.cancel();
                stopping = true;
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

/// Text mode prints the raw branch name, so detached HEAD and shutdown are
/// empty lines, matching `branch`.
fn print_update<W: Write>(out: &mut W, update: &BranchUpdate, json: bool) -> Result<()> {
    if json {
        writeln!(out, "{}", serde_json::to_string(update)?)?;
    } else {
        writeln!(out, "{}", update.branch)?;
    }
    out.flush()?;
    Ok(())
}

async fn run_tui(cwd: PathBuf, config: WatcherConfig) -> Result<()> {
    let feed = watch_branch(&cwd, config).await;

    // Set up channels between Backend and UiApp
    let (cmd_tx, cmd_rx) = tokio::sync::mpsc::channel(16);
    let (state_tx, state_rx) = tokio::sync::watch::channel(Arc::new(StateSnapshot::default()));
    let backend = Backend::new(cwd, feed, state_tx, DIFF_REFRESH_INTERVAL);
    let backend_task = tokio::spawn(backend.run(cmd_rx));

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let mut app = UiApp::new(state_rx, cmd_tx);
    let result = event_loop(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    // Dropping the app closes the command channel, which also stops the backend.
    drop(app);
    if let Err(e) = backend_task.await {
        tracing::warn!("backend task failed: {e}");
    }
    result
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut UiApp,
) -> Result<()> {
    let mut events = EventHandler::new(EVENT_TICK_RATE);
    terminal.draw(|frame| ui::draw(frame, app))?;

    // No I/O here besides drawing: the backend owns git and the watcher.
    while !app.should_quit {
        match events.next().await {
            Some(Event::Key(key)) => app.handle_key(key),
            Some(Event::Tick) => app.poll_state(),
            Some(Event::Resize) => app.needs_redraw = true,
            None => break,
        }

        if app.needs_redraw {
            terminal.draw(|frame| ui::draw(frame, app))?;
            app.needs_redraw = false;
        }
    }
    Ok(())
}

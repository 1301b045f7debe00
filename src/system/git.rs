use std::io::BufRead;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use tokio::process::Command;

use crate::models::DiffStatsResult;
use crate::system::process::{run_cmd_stdout, run_cmd_timeout};

/// How long any single git invocation may take before we give up.
pub const GIT_TIMEOUT: Duration = Duration::from_secs(3);

/// Hash of git's empty tree, used as the diff base in repos with no commits.
const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

/// Parse unified diff text into per-file line counts.
///
/// `---` and `@@` lines are skipped, `+++ b/<path>` selects the file that
/// following `+`/`-` lines are charged to. Lines seen before any `+++` marker
/// belong to no file.
pub fn parse_diff_stats(diff: &str) -> DiffStatsResult {
    let mut parser = DiffStatsParser::default();
    for line in diff.lines() {
        parser.feed(line);
    }
    parser.finish()
}

/// Streaming variant of [`parse_diff_stats`]. Fails only if the reader
/// cannot be read to the end (I/O error or invalid UTF-8).
pub fn parse_diff_stats_reader<R: BufRead>(reader: R) -> std::io::Result<DiffStatsResult> {
    let mut parser = DiffStatsParser::default();
    for line in reader.lines() {
        parser.feed(&line?);
    }
    Ok(parser.finish())
}

#[derive(Default)]
struct DiffStatsParser {
    current: Option<String>,
    stats: DiffStatsResult,
}

impl DiffStatsParser {
    fn feed(&mut self, line: &str) {
        if line.starts_with("---") || line.starts_with("@@") {
            return;
        }

        if line.starts_with("+++") {
            // A bare `+++` (or `+++ ` with nothing after) keeps the cursor.
            if let Some((_, path)) = line.split_once(' ') {
                let path = path.strip_prefix("b/").unwrap_or(path);
                if !path.is_empty() {
                    self.current = Some(path.to_string());
                }
            }
            return;
        }

        let Some(current) = self.current.as_deref() else {
            return;
        };
        // Context lines never create an entry on their own.
        let (added, removed) = match line.as_bytes().first() {
            Some(b'+') => (1, 0),
            Some(b'-') => (0, 1),
            _ => return,
        };
        let entry = self.stats.entry(current.to_string()).or_default();
        entry.added += added;
        entry.removed += removed;
    }

    fn finish(mut self) -> DiffStatsResult {
        for stats in self.stats.values_mut() {
            stats.modified = stats.added + stats.removed;
        }
        self.stats
    }
}

/// Best-effort current branch name for `cwd`.
/// Returns an empty string when not in a repo, git is missing, or HEAD is detached.
pub async fn current_branch(cwd: &Path) -> String {
    run_cmd_stdout(
        Command::new("git")
            .args(["branch", "--show-current"])
            .current_dir(cwd),
        GIT_TIMEOUT,
    )
    .await
    .unwrap_or_default()
}

/// Unified diff of the working tree against HEAD (or the empty tree when the
/// repository has no commits yet).
pub async fn working_tree_diff(cwd: &Path) -> Result<String> {
    let target = match run_cmd_timeout(
        Command::new("git")
            .args(["rev-parse", "--verify", "HEAD"])
            .current_dir(cwd),
        GIT_TIMEOUT,
    )
    .await
    {
        Ok(o) if o.status.success() => "HEAD",
        _ => EMPTY_TREE,
    };

    let output = run_cmd_timeout(
        Command::new("git")
            .args(["diff", "--no-color", "--no-ext-diff", target])
            .current_dir(cwd),
        GIT_TIMEOUT,
    )
    .await?;
    if !output.status.success() {
        anyhow::bail!(
            "git diff failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Run `git diff` in `cwd` and reduce it to per-file stats.
pub async fn working_tree_diff_stats(cwd: &Path) -> Result<DiffStatsResult> {
    let diff = working_tree_diff(cwd).await?;
    Ok(parse_diff_stats(&diff))
}

use std::collections::BTreeMap;

use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use crate::app::UiApp;
use crate::models::{total_added, total_removed, DiffFileStats, DiffStatsResult};
use crate::ui::truncate_chars;

/// Directory in the changes tree. Totals include everything below it.
#[derive(Default)]
struct Dir {
    added: u32,
    removed: u32,
    subdirs: BTreeMap<String, Dir>,
    files: BTreeMap<String, DiffFileStats>,
}

impl Dir {
    fn insert(&mut self, path: &str, stats: DiffFileStats) {
        if path.ends_with('/') {
            return;
        }
        let mut components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        let Some(name) = components.pop() else {
            return;
        };

        let mut dir = self;
        dir.tally(&stats);
        for component in components {
            dir = dir.subdirs.entry(component.to_string()).or_default();
            dir.tally(&stats);
        }
        let file = dir.files.entry(name.to_string()).or_default();
        file.added += stats.added;
        file.removed += stats.removed;
    }

    fn tally(&mut self, stats: &DiffFileStats) {
        self.added += stats.added;
        self.removed += stats.removed;
    }
}

/// One rendered tree line before width fitting.
struct Row {
    guide: String,
    label: String,
    added: u32,
    removed: u32,
}

fn collect_rows(dir: &Dir, guide: &str, rows: &mut Vec<Row>) {
    let total = dir.subdirs.len() + dir.files.len();
    let mut seen = 0;

    // Directories first, then files; both in name order.
    for (name, sub) in &dir.subdirs {
        seen += 1;
        let last = seen == total;
        rows.push(Row {
            guide: format!("{guide}{}", if last { "└ " } else { "├ " }),
            label: format!("{name}/"),
            added: sub.added,
            removed: sub.removed,
        });
        let nested = format!("{guide}{}", if last { "  " } else { "│ " });
        collect_rows(sub, &nested, rows);
    }
    for (name, stats) in &dir.files {
        seen += 1;
        rows.push(Row {
            guide: format!("{guide}{}", if seen == total { "└ " } else { "├ " }),
            label: name.clone(),
            added: stats.added,
            removed: stats.removed,
        });
    }
}

fn clip_label(label: &str, room: usize) -> String {
    let len = label.chars().count();
    match room {
        0 => String::new(),
        r if len <= r => label.to_string(),
        1 => truncate_chars(label, 1),
        r => format!("{}…", truncate_chars(label, r - 1)),
    }
}

/// Lay a row out so the stat is right-aligned, keeping one column free.
fn row_line(row: Row, width: usize) -> Line<'static> {
    let usable = width.saturating_sub(1);
    let stat_len = short_stat(row.added, row.removed).chars().count();
    let guide_len = row.guide.chars().count();
    let gap = usize::from(stat_len > 0);

    let label = clip_label(&row.label, usable.saturating_sub(guide_len + stat_len + gap));
    let pad = if stat_len == 0 {
        0
    } else {
        usable.saturating_sub(guide_len + label.chars().count() + stat_len)
    };

    let mut spans = vec![Span::raw(format!(
        "{}{label}{}",
        row.guide,
        " ".repeat(pad)
    ))];
    if row.added > 0 {
        spans.push(Span::styled(
            format!("+{}", row.added),
            Style::default().fg(Color::Green),
        ));
    }
    if row.removed > 0 {
        spans.push(Span::styled(
            format!("-{}", row.removed),
            Style::default().fg(Color::Red),
        ));
    }
    Line::from(spans)
}

/// Changed files grouped by directory, each directory showing the sum of
/// everything below it.
pub fn build_diff_tree_lines(stats: &DiffStatsResult, width: usize) -> Vec<Line<'static>> {
    let mut root = Dir::default();
    for (path, file_stats) in stats {
        root.insert(path, *file_stats);
    }

    let mut rows = Vec::new();
    collect_rows(&root, "", &mut rows);
    rows.into_iter().map(|row| row_line(row, width)).collect()
}

/// `+A-R`, dropping a side that is zero.
pub(crate) fn short_stat(added: u32, removed: u32) -> String {
    let mut out = String::new();
    if added > 0 {
        out.push_str(&format!("+{added}"));
    }
    if removed > 0 {
        out.push_str(&format!("-{removed}"));
    }
    out
}

pub(crate) fn draw_diff_tree(frame: &mut Frame, app: &UiApp, area: Rect) {
    let stats = &app.snapshot.diff_stats;
    let title = if stats.is_empty() {
        " Changes ".to_string()
    } else {
        format!(
            " Changes ({} files, {}) ",
            stats.len(),
            short_stat(total_added(stats), total_removed(stats))
        )
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(Style::default().fg(Color::Cyan));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let lines = app.diff_lines(inner.width as usize);
    if lines.is_empty() {
        frame.render_widget(Paragraph::new("No changes"), inner);
        return;
    }

    let visible = inner.height as usize;
    let first = app.diff_scroll.min(lines.len().saturating_sub(visible));
    let window: Vec<Line<'static>> = lines.iter().skip(first).take(visible).cloned().collect();
    frame.render_widget(Paragraph::new(window), inner);
}

pub mod diff;

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use crate::app::UiApp;

pub fn draw(frame: &mut Frame, app: &UiApp) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(1),
        ])
        .split(frame.area());

    draw_header(frame, app, chunks[0]);
    diff::draw_diff_tree(frame, app, chunks[1]);
    draw_help_bar(frame, app, chunks[2]);
}

/// Branch label shown in the header; detached HEAD has no name.
pub fn branch_label(branch: &str) -> &str {
    if branch.is_empty() {
        "(detached)"
    } else {
        branch
    }
}

fn draw_header(frame: &mut Frame, app: &UiApp, area: Rect) {
    let snapshot = &app.snapshot;
    let (mode, mode_color) = if snapshot.live {
        ("live", Color::Green)
    } else {
        ("snapshot", Color::Yellow)
    };

    let mut spans = vec![
        Span::styled(" ", Style::default()),
        Span::styled(
            branch_label(&snapshot.branch).to_string(),
            Style::default()
                .fg(Color::Magenta)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled("  ", Style::default()),
        Span::styled(format!("[{mode}]"), Style::default().fg(mode_color)),
    ];
    if let Some(at) = snapshot.branch_updated_at {
        spans.push(Span::styled(
            format!("  updated {}", at.format("%H:%M:%S")),
            Style::default().fg(Color::DarkGray),
        ));
    }

    let header = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Branch ")
            .border_style(Style::default().fg(Color::Magenta)),
    );
    frame.render_widget(header, area);
}

fn draw_help_bar(frame: &mut Frame, app: &UiApp, area: Rect) {
    let line = match app.snapshot.status_message.as_deref() {
        Some(msg) => Line::from(Span::styled(
            format!(" {msg}"),
            Style::default().fg(Color::Yellow),
        )),
        None => Line::from(Span::styled(
            " q quit  r refresh  j/k scroll  g top",
            Style::default().fg(Color::DarkGray),
        )),
    };
    frame.render_widget(Paragraph::new(line), area);
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

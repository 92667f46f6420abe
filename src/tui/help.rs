use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

const KEYS: &[(&str, &str)] = &[
    ("Ctrl-Q / Ctrl-C", "Quit"),
    ("Tab / ↑ / ↓", "Move between fields"),
    ("Space / ← / →", "Toggle mode (on the Mode field)"),
    ("Enter / F5 / Ctrl-P", "Preview now"),
    ("Esc", "Cancel the running preview"),
    ("Ctrl-R", "Create folders (asks y/n)"),
    ("Ctrl-A", "Toggle auto preview"),
    ("Ctrl-B", "Browse for base path"),
    ("Ctrl-S", "Save base path as default"),
    ("Ctrl-O", "Open base path"),
    ("PgUp / PgDn", "Select result row"),
    ("Ctrl-Y", "Copy selected row path to clipboard"),
    ("Ctrl-L", "Reload session"),
    ("Ctrl-X", "Shut down the backend"),
    ("F1", "Show/hide this help"),
];

pub fn draw_help(area: Rect, f: &mut Frame) {
    let width = KEYS.iter().map(|(k, _)| k.chars().count()).max().unwrap_or(0);
    let mut lines = vec![Line::from("Keybinds:")];
    lines.extend(KEYS.iter().map(|(key, what)| {
        Line::from(vec![
            Span::raw("  "),
            Span::styled(format!("{key:<width$}"), Style::default().fg(Color::Magenta)),
            Span::raw("  "),
            Span::raw(*what),
        ])
    }));
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::raw("Logs: "),
        Span::styled("--log-file <path>", Style::default().fg(Color::Cyan)),
        Span::raw(" with RUST_LOG=debug"),
    ]));

    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}

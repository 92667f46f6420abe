mod clipboard;
mod help;
mod state;

use crate::api::HttpBackend;
use crate::cli::{build_form, build_settings, state_dir, Cli};
use crate::form::FormState;
use crate::model::{ControllerEvent, Health};
use crate::orchestrator::{self, SkipCloseMarker, UiCommand};
use crate::render::Badge;
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Terminal,
};
use state::{KeyAction, UiState};
use std::future::Future;
use std::sync::Arc;
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tracing::{debug, info};

pub async fn run(args: Cli) -> Result<()> {
    let (event_tx, event_rx) = mpsc::unbounded_channel::<ControllerEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    let backend = Arc::new(HttpBackend::new(&args.backend_url)?);
    let settings = build_settings(&args);
    let marker = SkipCloseMarker::in_dir(&state_dir(&args));

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let form = build_form(&args);
    let auto_preview = args.auto_preview;
    let signals = tokio::spawn(quit_on(teardown_signal(), cmd_tx.downgrade()));
    let ui_handle =
        std::thread::spawn(move || run_threaded(form, auto_preview, event_rx, cmd_tx));

    let res = orchestrator::run_controller(backend, settings, marker, event_tx, cmd_rx).await;
    signals.abort();

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Resolves when the terminal goes away or the process is asked to stop.
async fn teardown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (signal(SignalKind::hangup()), signal(SignalKind::terminate())) {
            (Ok(mut hup), Ok(mut term)) => {
                tokio::select! {
                    _ = hup.recv() => {}
                    _ = term.recv() => {}
                    _ = tokio::signal::ctrl_c() => {}
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => debug!(error = %e, "unix signal handlers unavailable"),
        }
    }
    if let Err(e) = tokio::signal::ctrl_c().await {
        debug!(error = %e, "ctrl-c handler unavailable");
        futures::future::pending::<()>().await;
    }
}

/// Ask the controller to quit once `signal` fires, so the close notice still goes out.
/// Holds only a weak sender: the UI dropping its sender must still end the controller.
async fn quit_on(signal: impl Future<Output = ()>, cmd_tx: WeakUnboundedSender<UiCommand>) {
    signal.await;
    if let Some(tx) = cmd_tx.upgrade() {
        info!("termination signal received, quitting");
        let _ = tx.send(UiCommand::Quit);
    }
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    form: FormState,
    auto_preview: bool,
    mut event_rx: UnboundedReceiver<ControllerEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    // UiState is owned by the UI thread only; no cross-thread mutation.
    let mut state = UiState::new(form, auto_preview);
    // Startup counts as an edit, so a complete form gets its first auto preview.
    let _ = cmd_tx.send(UiCommand::InputChanged(state.form.read_payload()));

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        while let Ok(ev) = event_rx.try_recv() {
            if let Some(cmd) = state.apply_event(ev) {
                let _ = cmd_tx.send(cmd);
            }
        }
        if state.closed {
            break Ok(());
        }

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                match state.handle_key(k) {
                    KeyAction::Nothing => {}
                    KeyAction::Send(cmd) => {
                        if cmd_tx.send(cmd).is_err() {
                            break Ok(());
                        }
                    }
                    KeyAction::Copy(path) => match clipboard::copy_to_clipboard(&path) {
                        Ok(()) => {
                            state.status = crate::model::StatusLine::info(format!(
                                "copied: {}",
                                truncate_middle(&path, 60)
                            ));
                        }
                        Err(e) => {
                            state.status =
                                crate::model::StatusLine::error(format!("clipboard: {e:#}"));
                        }
                    },
                    KeyAction::Quit => {
                        let _ = cmd_tx.send(UiCommand::Quit);
                        break Ok(());
                    }
                }
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

fn truncate_middle(s: &str, max: usize) -> String {
    let n = s.chars().count();
    if n <= max {
        return s.to_string();
    }
    let keep = max.saturating_sub(3) / 2;
    let head: String = s.chars().take(keep).collect();
    let tail: String = s.chars().skip(n - keep).collect();
    format!("{head}...{tail}")
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let form_height = state.form.visible_fields().len() as u16 + 2;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(3),
                Constraint::Length(form_height),
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(3),
            ]
            .as_ref(),
        )
        .split(area);

    draw_header(chunks[0], f, state);
    draw_form(chunks[1], f, state);
    draw_summary(chunks[2], f, state);
    if state.show_help {
        help::draw_help(chunks[3], f);
    } else {
        draw_results(chunks[3], f, state);
    }
    draw_status(chunks[4], f, state);
}

fn draw_header(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let health_style = match state.health {
        Health::Ok => Style::default().fg(Color::Green),
        Health::Ng => Style::default().fg(Color::Red),
        Health::Unknown => Style::default().fg(Color::DarkGray),
    };
    let config = state.config_path.as_deref().unwrap_or("---");
    let auto = if state.auto_preview { "on" } else { "off" };
    let line = Line::from(vec![
        Span::styled("backend ", Style::default().fg(Color::Gray)),
        Span::styled(state.health.label(), health_style),
        Span::raw("   "),
        Span::styled("auto preview ", Style::default().fg(Color::Gray)),
        Span::raw(auto),
        Span::raw("   "),
        Span::styled("config ", Style::default().fg(Color::Gray)),
        Span::raw(config.to_string()),
    ]);
    let p = Paragraph::new(line).block(
        Block::default()
            .borders(Borders::ALL)
            .title("dated-folders (F1 help)"),
    );
    f.render_widget(p, area);
}

fn draw_form(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let focused = state.focused_field();
    let fields = state.form.visible_fields();
    let label_w = fields
        .iter()
        .map(|fl| fl.label().chars().count())
        .max()
        .unwrap_or(0);

    let lines: Vec<Line> = fields
        .iter()
        .map(|&field| {
            let value = if field == crate::form::FormField::Mode {
                state.mode_toggle_text()
            } else {
                state.form.text(field).to_string()
            };
            let (marker, style) = if field == focused {
                ("> ", Style::default().fg(Color::Yellow))
            } else {
                ("  ", Style::default())
            };
            Line::from(vec![
                Span::styled(marker, style),
                Span::styled(
                    format!("{:<label_w$}", field.label()),
                    Style::default().fg(Color::Gray),
                ),
                Span::raw("  "),
                Span::styled(value, style),
            ])
        })
        .collect();

    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Plan"));
    f.render_widget(p, area);
}

fn draw_summary(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let mut spans = Vec::new();
    for (i, (k, v)) in state.view.summary.fields().iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw("   "));
        }
        spans.push(Span::styled(format!("{k} "), Style::default().fg(Color::Gray)));
        spans.push(Span::styled(
            v.to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        ));
    }

    let mut title = String::from("Summary");
    if state.busy {
        title.push_str(" [working]");
    }
    if state.dirty {
        title.push_str(" [changed]");
    }
    let p = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(p, area);
}

fn draw_results(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let header = Row::new(vec!["Kind", "Date", "Folder", "Action", "Path"])
        .style(Style::default().fg(Color::Gray));

    let rows: Vec<Row> = state
        .view
        .rows
        .iter()
        .map(|r| {
            let action = match &r.action {
                Some((Badge::Create, text)) => {
                    Cell::from(text.clone()).style(Style::default().fg(Color::Green))
                }
                Some((Badge::Skip, text)) => {
                    Cell::from(text.clone()).style(Style::default().fg(Color::DarkGray))
                }
                None => Cell::from(""),
            };
            Row::new(vec![
                Cell::from(r.kind.label()),
                Cell::from(r.date.clone()),
                Cell::from(r.folder_name.clone()),
                action,
                Cell::from(r.full_path.clone()),
            ])
        })
        .collect();

    let widths = [
        Constraint::Length(5),
        Constraint::Length(10),
        Constraint::Length(16),
        Constraint::Length(8),
        Constraint::Min(10),
    ];
    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(format!(
            "Folders ({})",
            state.view.rows.len()
        )))
        .row_highlight_style(Style::default().fg(Color::Yellow));

    let mut table_state = TableState::default();
    if !state.view.rows.is_empty() {
        table_state.select(Some(state.selected_row));
    }
    f.render_stateful_widget(table, area, &mut table_state);
}

fn draw_status(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let line = if state.confirm_run {
        Line::from(Span::styled(
            format!(
                "Create folders under {}? (y/n)",
                state.form.base_path.trim()
            ),
            Style::default().fg(Color::Yellow),
        ))
    } else {
        let style = if state.status.is_error() {
            Style::default().fg(Color::Red)
        } else {
            Style::default()
        };
        Line::from(Span::styled(state.status.text.clone(), style))
    };
    let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(p, area);
}

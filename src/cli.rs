use crate::api::{Backend, HttpBackend};
use crate::form::{validate, FormState};
use crate::model::{ControllerEvent, ControllerSettings, Mode, PickedFolder, PreviewOutcome};
use crate::orchestrator::{self, SkipCloseMarker, UiCommand};
use crate::render::PreviewView;
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "dated-folders",
    version,
    about = "Preview and create date-stamped folder trees through the local folder backend"
)]
pub struct Cli {
    /// Base URL of the local folder backend
    #[arg(long, default_value = "http://127.0.0.1:8765")]
    pub backend_url: String,

    /// Folder under which the year/month/day tree is created
    #[arg(long)]
    pub base_path: Option<String>,

    /// How the day span is given
    #[arg(long, value_enum, default_value_t = Mode::Range)]
    pub mode: Mode,

    /// First day (YYYY-MM-DD); defaults to today
    #[arg(long)]
    pub start_date: Option<String>,

    /// Last day in range mode (YYYY-MM-DD); defaults to two days after today
    #[arg(long)]
    pub end_date: Option<String>,

    /// Number of days in days mode
    #[arg(long, default_value_t = 3)]
    pub days: i64,

    /// Highest numbered sub-folder per day
    #[arg(long, default_value_t = 5)]
    pub folders_per_day: i64,

    /// Number of the first sub-folder on the first day
    #[arg(long, default_value_t = 1)]
    pub first_index: i64,

    /// Client-side ceiling for a single preview request
    #[arg(long, default_value = "30s")]
    pub preview_timeout: humantime::Duration,

    /// Quiet period before an automatic preview fires
    #[arg(long, default_value = "450ms")]
    pub debounce: humantime::Duration,

    /// Keep-alive and health check interval
    #[arg(long, default_value = "5s")]
    pub keepalive_interval: humantime::Duration,

    /// How long the close notice may take before it is abandoned
    #[arg(long, default_value = "1s")]
    pub beacon_grace: humantime::Duration,

    /// Use --auto-preview true or --auto-preview false to override
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub auto_preview: bool,

    /// Print the preview (or run) as JSON and exit (no TUI)
    #[arg(long)]
    pub json: bool,

    /// Print the preview (or run) as text and exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Create the folders instead of previewing them (requires --yes)
    #[arg(long)]
    pub run: bool,

    /// Confirm --run without prompting
    #[arg(long)]
    pub yes: bool,

    /// Open the backend's folder picker and print the chosen path
    #[arg(long)]
    pub pick_folder: bool,

    /// Persist --base-path as the backend's default and exit
    #[arg(long)]
    pub save_base_path: bool,

    /// Open --base-path in the system file browser and exit
    #[arg(long)]
    pub open_folder: bool,

    /// Ask the backend to shut down and exit
    #[arg(long)]
    pub shutdown: bool,

    /// Directory for session state (reload marker)
    #[arg(long)]
    pub state_dir: Option<PathBuf>,

    /// Append logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// True for every mode that prints and exits instead of opening the TUI.
    pub fn is_one_shot(&self) -> bool {
        self.json
            || self.text
            || self.run
            || self.pick_folder
            || self.save_base_path
            || self.open_folder
            || self.shutdown
    }
}

/// Install the global tracing subscriber. The TUI owns the terminal, so it only logs to a file.
pub fn init_logging(args: &Cli) {
    if let Some(path) = args.log_file.as_deref() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
        {
            Ok(file) => {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file))
                    .try_init();
                return;
            }
            Err(e) => eprintln!("cannot open log file {}: {e}", path.display()),
        }
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    if args.is_one_shot() || cfg!(not(feature = "tui")) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::sink)
            .try_init();
    }
}

pub async fn run(args: Cli) -> Result<()> {
    if args.keepalive_interval.is_zero() {
        return Err(anyhow::anyhow!("--keepalive-interval must be greater than zero"));
    }
    if args.run && !args.yes {
        return Err(anyhow::anyhow!(
            "--run creates folders; pass --yes to confirm."
        ));
    }

    if args.shutdown {
        return run_shutdown(args).await;
    }
    if args.pick_folder || args.save_base_path || args.open_folder {
        return run_backend_action(args).await;
    }

    if !args.is_one_shot() {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(args).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            // Fallback when built without TUI support.
            return run_plan(args).await;
        }
    }

    run_plan(args).await
}

/// Today's date in local time, falling back to UTC when the offset is unknown.
pub fn today() -> time::Date {
    time::OffsetDateTime::now_local()
        .unwrap_or_else(|_| time::OffsetDateTime::now_utc())
        .date()
}

/// Build the initial form from CLI arguments.
pub fn build_form(args: &Cli) -> FormState {
    let mut form = FormState::with_defaults(today());
    form.mode = args.mode;
    if let Some(p) = args.base_path.as_deref() {
        form.base_path = p.to_string();
    }
    if let Some(d) = args.start_date.as_deref() {
        form.start_date = d.to_string();
    }
    if let Some(d) = args.end_date.as_deref() {
        form.end_date = d.to_string();
    }
    form.days_to_make = args.days.to_string();
    form.folders_per_day = args.folders_per_day.to_string();
    form.first_day_start_index = args.first_index.to_string();
    form
}

/// Build controller timings from CLI arguments.
pub fn build_settings(args: &Cli) -> ControllerSettings {
    ControllerSettings {
        preview_timeout: Duration::from(args.preview_timeout),
        debounce: Duration::from(args.debounce),
        keepalive_interval: Duration::from(args.keepalive_interval),
        beacon_grace: Duration::from(args.beacon_grace),
        auto_preview: args.auto_preview,
        close_on_exit: true,
    }
}

pub fn state_dir(args: &Cli) -> PathBuf {
    args.state_dir.clone().unwrap_or_else(|| {
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("dated-folders")
    })
}

/// Preview (or, with --run, create) once through the controller and print the result.
async fn run_plan(args: Cli) -> Result<()> {
    let payload = build_form(&args).read_payload();
    let errors = validate(&payload);
    if !errors.is_empty() {
        return Err(anyhow::anyhow!("invalid input: {}", errors.join("; ")));
    }

    let backend = Arc::new(HttpBackend::new(&args.backend_url)?);
    let settings = ControllerSettings {
        auto_preview: false,
        close_on_exit: false,
        ..build_settings(&args)
    };
    let marker = SkipCloseMarker::in_dir(&state_dir(&args));
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ControllerEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let handle = tokio::spawn(orchestrator::run_controller(
        backend, settings, marker, event_tx, cmd_rx,
    ));

    let first = if args.run {
        UiCommand::Run {
            payload,
            confirmed: args.yes,
        }
    } else {
        UiCommand::Preview(payload)
    };
    let _ = cmd_tx.send(first);

    let (out_tx, out_handle) = spawn_output_writer();
    let mut view: Option<PreviewView> = None;
    let mut failure: Option<String> = None;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            ev = event_rx.recv() => {
                let Some(ev) = ev else { break };
                match ev {
                    ControllerEvent::Status(s) => {
                        let _ = out_tx.send(OutputLine::Stderr(s.text));
                    }
                    ControllerEvent::View(v) => view = Some(v),
                    ControllerEvent::PreviewFinished(outcome) => {
                        failure = match outcome {
                            PreviewOutcome::Applied => None,
                            PreviewOutcome::Rejected(errors) => Some(errors.join("; ")),
                            PreviewOutcome::TimedOut => Some("preview timed out".into()),
                            PreviewOutcome::Canceled => Some("preview canceled".into()),
                            PreviewOutcome::Errored(msg) => Some(msg),
                        };
                        let _ = cmd_tx.send(UiCommand::Quit);
                    }
                    ControllerEvent::RunFinished { ok } => {
                        if !ok {
                            failure = Some("run failed".into());
                        }
                        let _ = cmd_tx.send(UiCommand::Quit);
                    }
                    ControllerEvent::Closed => break,
                    _ => {}
                }
            }
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                failure = Some("interrupted".into());
                let _ = cmd_tx.send(UiCommand::Quit);
            }
        }
    }

    handle.await.context("controller task failed")??;

    if failure.is_none() {
        if let Some(view) = view.as_ref() {
            if args.json {
                let out = serde_json::to_string_pretty(view)?;
                let _ = out_tx.send(OutputLine::Stdout(out));
            } else {
                let summary = crate::text_summary::build_text_summary(view);
                for line in summary.lines {
                    let _ = out_tx.send(OutputLine::Stdout(line));
                }
            }
        }
    }
    drop(out_tx);
    let _ = out_handle.await;

    match failure {
        Some(msg) => Err(anyhow::anyhow!(msg)),
        None => Ok(()),
    }
}

/// Folder picker, base-path save and open-folder talk to the backend directly.
async fn run_backend_action(args: Cli) -> Result<()> {
    let backend = HttpBackend::new(&args.backend_url)?;
    let base_path = args.base_path.clone().unwrap_or_default();

    if args.pick_folder {
        match backend.pick_folder(base_path.trim()).await? {
            PickedFolder::Path(p) => println!("{p}"),
            PickedFolder::Canceled => eprintln!("canceled"),
        }
        return Ok(());
    }

    if base_path.trim().is_empty() {
        return Err(anyhow::anyhow!("base path is empty; pass --base-path"));
    }
    if args.save_base_path {
        let config_path = backend
            .save_base_path(base_path.trim())
            .await
            .context("save base path")?;
        match config_path {
            Some(p) => eprintln!("base path saved ({p})"),
            None => eprintln!("base path saved"),
        }
    }
    if args.open_folder {
        backend
            .open_folder(base_path.trim())
            .await
            .context("open folder")?;
        eprintln!("folder opened");
    }
    Ok(())
}

async fn run_shutdown(args: Cli) -> Result<()> {
    let backend = Arc::new(HttpBackend::new(&args.backend_url)?);
    let marker = SkipCloseMarker::in_dir(&state_dir(&args));
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ControllerEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let settings = ControllerSettings {
        auto_preview: false,
        close_on_exit: false,
        ..build_settings(&args)
    };
    let handle = tokio::spawn(orchestrator::run_controller(
        backend, settings, marker, event_tx, cmd_rx,
    ));
    let _ = cmd_tx.send(UiCommand::Shutdown);
    while let Some(ev) = event_rx.recv().await {
        if matches!(ev, ControllerEvent::Closed) {
            break;
        }
    }
    handle.await.context("controller task failed")??;
    eprintln!("shutdown requested");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_takes_cli_overrides() {
        let args = Cli::parse_from([
            "dated-folders",
            "--base-path",
            "C:/x",
            "--mode",
            "days",
            "--start-date",
            "2024-01-01",
            "--days",
            "4",
            "--folders-per-day",
            "2",
        ]);
        let p = build_form(&args).read_payload();
        assert_eq!(p.base_path, "C:/x");
        assert_eq!(p.mode, Mode::Days);
        assert_eq!(p.start_date, "2024-01-01");
        assert_eq!(p.days_to_make, Some(4));
        assert_eq!(p.folders_per_day, Some(2));
        assert_eq!(p.first_day_start_index, Some(1));
        assert!(validate(&p).is_empty());
    }

    #[test]
    fn default_timings() {
        let args = Cli::parse_from(["dated-folders"]);
        let s = build_settings(&args);
        assert_eq!(s.preview_timeout, Duration::from_secs(30));
        assert_eq!(s.debounce, Duration::from_millis(450));
        assert_eq!(s.keepalive_interval, Duration::from_secs(5));
        assert!(s.auto_preview);
        assert!(s.close_on_exit);
        assert!(!args.is_one_shot());
    }

    #[test]
    fn one_shot_modes_are_detected() {
        assert!(Cli::parse_from(["dated-folders", "--json"]).is_one_shot());
        assert!(Cli::parse_from(["dated-folders", "--shutdown"]).is_one_shot());
        let args = Cli::parse_from(["dated-folders", "--auto-preview", "false"]);
        assert!(!args.auto_preview);
    }

    #[tokio::test]
    async fn run_without_yes_is_refused() {
        let args = Cli::parse_from(["dated-folders", "--run", "--base-path", "C:/x"]);
        let err = run(args).await.unwrap_err();
        assert!(err.to_string().contains("--yes"));
    }
}

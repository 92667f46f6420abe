use crate::render::PreviewView;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the day span of a plan is expressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum Mode {
    /// Start and end date, inclusive.
    #[default]
    Range,
    /// Start date plus a number of days.
    Days,
}

impl Mode {
    pub fn toggled(self) -> Self {
        match self {
            Mode::Range => Mode::Days,
            Mode::Days => Mode::Range,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Mode::Range => "Range",
            Mode::Days => "Days",
        }
    }
}

/// Request body for `/api/preview` and `/api/run`.
///
/// Integer fields are `None` when the form text did not parse; they serialize as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormPayload {
    pub base_path: String,
    pub mode: Mode,
    pub start_date: String,
    pub end_date: Option<String>,
    pub days_to_make: Option<i64>,
    pub folders_per_day: Option<i64>,
    pub first_day_start_index: Option<i64>,
}

/// One planned folder as reported by the backend.
///
/// The backend writes PascalCase keys and older builds omit `Kind`/`Action`
/// in favour of a free-text `Result`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PlanItem {
    pub kind: Option<String>,
    pub date: Option<String>,
    pub folder_name: Option<String>,
    pub action: Option<String>,
    pub result: Option<String>,
    pub full_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Summary {
    pub days: Option<u64>,
    pub total: u64,
    pub create: u64,
    pub skip: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewResult {
    pub items: Vec<PlanItem>,
    pub summary: Option<Summary>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunReport {
    pub items: Vec<PlanItem>,
    #[serde(deserialize_with = "null_as_zero")]
    pub created: u64,
    #[serde(deserialize_with = "null_as_zero")]
    pub skipped: u64,
}

/// Counters the backend may send as `null`.
fn null_as_zero<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(deserializer)?.unwrap_or(0))
}

impl RunReport {
    /// Summary shown after a run; the backend does not report a day count here.
    pub fn summary(&self) -> Summary {
        Summary {
            days: None,
            total: self.created + self.skipped,
            create: self.created,
            skip: self.skipped,
        }
    }
}

/// Persisted backend configuration as returned by `GET /api/config`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigInfo {
    pub config_path: Option<String>,
    pub default_base_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickedFolder {
    Path(String),
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Unknown,
    Ok,
    Ng,
}

impl Health {
    pub fn label(self) -> &'static str {
        match self {
            Health::Unknown => "...",
            Health::Ok => "OK",
            Health::Ng => "NG",
        }
    }
}

/// Status bar text. Anything starting with `error:` renders in error style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub text: String,
}

impl StatusLine {
    pub fn info(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn error(message: impl std::fmt::Display) -> Self {
        Self {
            text: format!("error: {message}"),
        }
    }

    pub fn is_error(&self) -> bool {
        self.text.starts_with("error:")
    }
}

/// Terminal state of a single preview attempt, as seen by presentation layers.
///
/// Superseded attempts never surface here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewOutcome {
    Rejected(Vec<String>),
    Applied,
    TimedOut,
    Canceled,
    Errored(String),
}

/// Timing knobs for the controller loop.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub preview_timeout: Duration,
    pub debounce: Duration,
    pub keepalive_interval: Duration,
    pub beacon_grace: Duration,
    pub auto_preview: bool,
    /// Send the close notice on teardown. One-shot runs leave the backend session alone.
    pub close_on_exit: bool,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            preview_timeout: Duration::from_secs(30),
            debounce: Duration::from_millis(450),
            keepalive_interval: Duration::from_secs(5),
            beacon_grace: Duration::from_secs(1),
            auto_preview: true,
            close_on_exit: true,
        }
    }
}

/// Events emitted by the controller and consumed by UI/CLI layers.
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    Status(StatusLine),
    Busy(bool),
    Dirty(bool),
    View(PreviewView),
    Health(Health),
    ConfigPath(Option<String>),
    /// Backend-configured default; the form only takes it when its base path is empty.
    DefaultBasePath(String),
    BasePathPicked(String),
    PreviewFinished(PreviewOutcome),
    RunFinished { ok: bool },
    SessionRestarted,
    Closed,
}

//! Preview/run controller.
//!
//! Owns the session state and is the only place it is mutated. Network calls run
//! on spawned tasks and report back through a completion channel, so every state
//! change happens on this loop in arrival order while the epoch check decides
//! which preview results are still wanted.

use super::debounce::{sleep_until_opt, Debouncer};
use super::lifecycle::{Lifecycle, SkipCloseMarker};
use super::sequencer::{execute_preview, PreviewSequencer, Settlement};
use crate::api::{ApiError, Backend};
use crate::form::{can_auto_preview, validate};
use crate::model::{
    ConfigInfo, ControllerEvent, ControllerSettings, FormPayload, Health, PickedFolder,
    PreviewOutcome, PreviewResult, RunReport, StatusLine,
};
use crate::render::{render_view, PreviewView};
use anyhow::Result;
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

/// Commands emitted by UI layers.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    /// A form field changed; carries a fresh snapshot for auto-preview.
    InputChanged(FormPayload),
    Preview(FormPayload),
    CancelPreview,
    /// Runs are destructive; the UI must have asked the user first.
    Run {
        payload: FormPayload,
        confirmed: bool,
    },
    PickFolder {
        initial_path: String,
    },
    SaveBasePath(String),
    OpenFolder(String),
    SetAutoPreview(bool),
    Reload,
    Shutdown,
    Quit,
}

/// Results of spawned backend calls, applied back on the controller loop.
#[derive(Debug)]
enum Completion {
    Preview {
        epoch: u64,
        result: Result<PreviewResult, ApiError>,
    },
    Run(Result<RunReport, ApiError>),
    Config(Result<ConfigInfo, ApiError>),
    BasePathSaved(Result<Option<String>, ApiError>),
    FolderPicked(Result<PickedFolder, ApiError>),
    FolderOpened(Result<(), ApiError>),
    Health(bool),
}

/// Everything that belongs to one UI session.
struct Session {
    sequencer: PreviewSequencer,
    debounce: Debouncer,
    pending_input: Option<FormPayload>,
    dirty: bool,
    view: PreviewView,
    lifecycle: Lifecycle,
}

impl Session {
    fn new(settings: &ControllerSettings, lifecycle: Lifecycle) -> Self {
        Self {
            sequencer: PreviewSequencer::default(),
            debounce: Debouncer::new(settings.debounce),
            pending_input: None,
            dirty: false,
            view: PreviewView::default(),
            lifecycle,
        }
    }

    /// Start over with fresh state. Epochs keep counting so late completions stay stale.
    fn restart(&mut self) {
        self.sequencer.invalidate();
        self.debounce.clear();
        self.pending_input = None;
        self.dirty = false;
        self.view = PreviewView::default();
        self.lifecycle = self.lifecycle.restarted();
    }
}

struct Controller<B: Backend> {
    backend: Arc<B>,
    settings: ControllerSettings,
    event_tx: UnboundedSender<ControllerEvent>,
    done_tx: UnboundedSender<(u64, Completion)>,
    heartbeat: Interval,
    session: Session,
    /// Bumped on every session restart; completions from older sessions are dropped.
    generation: u64,
}

impl<B: Backend> Controller<B> {
    fn new(
        backend: Arc<B>,
        settings: ControllerSettings,
        marker: SkipCloseMarker,
        event_tx: UnboundedSender<ControllerEvent>,
        done_tx: UnboundedSender<(u64, Completion)>,
    ) -> Self {
        let period = settings.keepalive_interval;
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let session = Session::new(&settings, Lifecycle::new(marker));
        Self {
            backend,
            settings,
            event_tx,
            done_tx,
            heartbeat,
            session,
            generation: 0,
        }
    }

    fn emit(&self, ev: ControllerEvent) {
        let _ = self.event_tx.send(ev);
    }

    fn status(&self, line: StatusLine) {
        self.emit(ControllerEvent::Status(line));
    }

    fn show_view(&mut self, view: PreviewView) {
        self.session.view = view.clone();
        self.emit(ControllerEvent::View(view));
    }

    /// Run a backend call on its own task and feed the result back to the loop.
    fn spawn_call<F, Fut>(&self, call: F)
    where
        F: FnOnce(Arc<B>) -> Fut,
        Fut: Future<Output = Completion> + Send + 'static,
    {
        let fut = call(self.backend.clone());
        let done_tx = self.done_tx.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            let _ = done_tx.send((generation, fut.await));
        });
    }

    /// Session start: config load plus the first keep-alive and health check.
    fn start_session(&mut self) {
        self.spawn_call(|b| async move { Completion::Config(b.load_config().await) });
        self.send_heartbeat();
    }

    /// Ping and health calls must settle before the next tick so they never pile up.
    fn heartbeat_limit(&self) -> Duration {
        self.settings.keepalive_interval / 2
    }

    fn send_heartbeat(&self) {
        let limit = self.heartbeat_limit();
        let backend = self.backend.clone();
        tokio::spawn(async move {
            match tokio::time::timeout(limit, backend.ping()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(error = %e, "keep-alive ping failed"),
                Err(_) => debug!("keep-alive ping timed out"),
            }
        });
        self.spawn_call(move |b| async move {
            let ok = matches!(tokio::time::timeout(limit, b.health()).await, Ok(Ok(())));
            Completion::Health(ok)
        });
    }

    async fn handle(&mut self, cmd: UiCommand) -> ControlFlow<()> {
        match cmd {
            UiCommand::InputChanged(payload) => {
                self.mark_dirty();
                if self.settings.auto_preview {
                    self.session.pending_input = Some(payload);
                    self.session.debounce.poke();
                }
            }
            UiCommand::Preview(payload) => {
                self.session.debounce.clear();
                self.session.pending_input = None;
                self.trigger_preview(payload, true);
            }
            UiCommand::CancelPreview => {
                if !self.session.sequencer.cancel_current() {
                    debug!("cancel requested with no preview in flight");
                }
            }
            UiCommand::Run { payload, confirmed } => self.start_run(payload, confirmed),
            UiCommand::PickFolder { initial_path } => {
                self.status(StatusLine::info("select folder..."));
                self.spawn_call(move |b| async move {
                    Completion::FolderPicked(b.pick_folder(&initial_path).await)
                });
            }
            UiCommand::SaveBasePath(base_path) => {
                let base_path = base_path.trim().to_string();
                if base_path.is_empty() {
                    self.status(StatusLine::error("base path is empty"));
                    return ControlFlow::Continue(());
                }
                self.status(StatusLine::info("saving base path..."));
                self.spawn_call(move |b| async move {
                    Completion::BasePathSaved(b.save_base_path(&base_path).await)
                });
            }
            UiCommand::OpenFolder(path) => {
                let path = path.trim().to_string();
                if path.is_empty() {
                    self.status(StatusLine::error("base path is empty"));
                    return ControlFlow::Continue(());
                }
                self.spawn_call(move |b| async move {
                    Completion::FolderOpened(b.open_folder(&path).await)
                });
            }
            UiCommand::SetAutoPreview(on) => {
                self.settings.auto_preview = on;
                if !on {
                    self.session.debounce.clear();
                    self.session.pending_input = None;
                }
                self.status(StatusLine::info(if on {
                    "auto preview on"
                } else {
                    "auto preview off"
                }));
            }
            UiCommand::Reload => self.reload().await,
            UiCommand::Shutdown => {
                if self.shutdown().await {
                    return ControlFlow::Break(());
                }
            }
            UiCommand::Quit => {
                self.teardown().await;
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn mark_dirty(&mut self) {
        if !self.session.dirty {
            self.session.dirty = true;
            self.emit(ControllerEvent::Dirty(true));
        }
        if !self.session.sequencer.is_busy() {
            self.status(StatusLine::info("changed, press preview to refresh"));
        }
    }

    /// Validate and issue a preview. Automatic triggers are pre-checked and never report errors.
    fn trigger_preview(&mut self, payload: FormPayload, explicit: bool) {
        let errors = validate(&payload);
        if !errors.is_empty() {
            if explicit {
                self.status(StatusLine::error(&errors[0]));
                self.emit(ControllerEvent::PreviewFinished(PreviewOutcome::Rejected(
                    errors,
                )));
            }
            return;
        }

        let ticket = self.session.sequencer.begin();
        debug!(epoch = ticket.epoch, explicit, "preview issued");
        self.emit(ControllerEvent::Busy(true));
        self.status(StatusLine::info("previewing..."));

        let timeout = self.settings.preview_timeout;
        self.spawn_call(move |b| async move {
            let result = execute_preview(&*b, &payload, &ticket.cancel, timeout).await;
            Completion::Preview {
                epoch: ticket.epoch,
                result,
            }
        });
    }

    fn debounce_elapsed(&mut self) {
        if !self.session.debounce.take_elapsed() {
            return;
        }
        let Some(payload) = self.session.pending_input.take() else {
            return;
        };
        if can_auto_preview(&payload) {
            self.trigger_preview(payload, false);
        } else {
            debug!("auto preview skipped, form not ready");
        }
    }

    fn start_run(&mut self, payload: FormPayload, confirmed: bool) {
        if !confirmed {
            self.status(StatusLine::info("run not confirmed"));
            return;
        }
        let errors = validate(&payload);
        if let Some(first) = errors.first() {
            self.status(StatusLine::error(first));
            self.emit(ControllerEvent::RunFinished { ok: false });
            return;
        }
        info!(base_path = %payload.base_path, "creating folders");
        self.status(StatusLine::info("running..."));
        self.spawn_call(move |b| async move { Completion::Run(b.run(&payload).await) });
    }

    fn apply(&mut self, generation: u64, done: Completion) {
        if generation != self.generation {
            debug!(generation, current = self.generation, "dropping result from previous session");
            return;
        }
        match done {
            Completion::Preview { epoch, result } => self.apply_preview(epoch, result),
            Completion::Run(Ok(report)) => {
                info!(
                    created = report.created,
                    skipped = report.skipped,
                    "run finished"
                );
                self.status(StatusLine::info(format!(
                    "done (created: {}, skipped: {})",
                    report.created, report.skipped
                )));
                let view = render_view(&report.items, Some(&report.summary()));
                self.show_view(view);
                self.emit(ControllerEvent::RunFinished { ok: true });
            }
            Completion::Run(Err(e)) => {
                self.status(StatusLine::error(&e));
                self.emit(ControllerEvent::RunFinished { ok: false });
            }
            Completion::Config(Ok(info)) => {
                self.emit(ControllerEvent::ConfigPath(info.config_path));
                if let Some(p) = info.default_base_path {
                    self.emit(ControllerEvent::DefaultBasePath(p));
                }
                self.status(StatusLine::info("config loaded"));
            }
            Completion::Config(Err(e)) => {
                debug!(error = %e, "config load");
                self.status(StatusLine::info(match e {
                    ApiError::Backend { .. } => "config load failed",
                    _ => "config load error",
                }));
            }
            Completion::BasePathSaved(Ok(config_path)) => {
                if config_path.is_some() {
                    self.emit(ControllerEvent::ConfigPath(config_path));
                }
                self.status(StatusLine::info("base path saved"));
            }
            Completion::BasePathSaved(Err(e)) => self.status(StatusLine::error(&e)),
            Completion::FolderPicked(Ok(PickedFolder::Path(p))) => {
                self.emit(ControllerEvent::BasePathPicked(p));
                self.status(StatusLine::info("folder selected"));
            }
            Completion::FolderPicked(Ok(PickedFolder::Canceled)) => {
                self.status(StatusLine::info("canceled"));
            }
            Completion::FolderPicked(Err(e)) => self.status(StatusLine::error(&e)),
            Completion::FolderOpened(Ok(())) => self.status(StatusLine::info("folder opened")),
            Completion::FolderOpened(Err(e)) => self.status(StatusLine::error(&e)),
            Completion::Health(ok) => {
                self.emit(ControllerEvent::Health(if ok { Health::Ok } else { Health::Ng }));
            }
        }
    }

    fn apply_preview(&mut self, epoch: u64, result: Result<PreviewResult, ApiError>) {
        let settlement = self.session.sequencer.settle(epoch, result);
        let Some(outcome) = settlement.outcome() else {
            debug!(
                epoch,
                current = self.session.sequencer.epoch(),
                "discarding superseded preview"
            );
            return;
        };
        match settlement {
            Settlement::Apply(r) => {
                let view = render_view(&r.items, r.summary.as_ref());
                self.show_view(view);
                self.session.dirty = false;
                self.emit(ControllerEvent::Dirty(false));
                self.status(StatusLine::info("preview complete"));
            }
            Settlement::TimedOut => self.status(StatusLine::info("preview timed out")),
            Settlement::Canceled => self.status(StatusLine::info("preview canceled")),
            Settlement::Errored(msg) => {
                self.show_view(PreviewView::default());
                self.status(StatusLine::error(msg));
            }
            Settlement::Superseded => {}
        }
        self.emit(ControllerEvent::Busy(false));
        self.emit(ControllerEvent::PreviewFinished(outcome));
    }

    /// Stop outstanding work and send the close notice if this teardown warrants one.
    async fn end_session(&mut self) {
        self.session.sequencer.invalidate();
        self.session.debounce.clear();
        debug!(flags = ?self.session.lifecycle.flags(), "ending session");
        if self.settings.close_on_exit && self.session.lifecycle.should_send_close() {
            info!("sending close notice");
            if let Err(e) = self.backend.close(self.settings.beacon_grace).await {
                debug!(error = %e, "close notice not delivered");
            }
        }
    }

    async fn teardown(&mut self) {
        self.end_session().await;
        self.emit(ControllerEvent::Closed);
    }

    async fn reload(&mut self) {
        info!("reloading session");
        self.session.lifecycle.begin_reload();
        self.end_session().await;
        self.session.restart();
        self.generation += 1;
        self.emit(ControllerEvent::SessionRestarted);
        self.emit(ControllerEvent::Busy(false));
        self.emit(ControllerEvent::Dirty(false));
        self.emit(ControllerEvent::View(self.session.view.clone()));
        self.heartbeat.reset();
        self.start_session();
    }

    /// Returns false when a shutdown was already requested.
    async fn shutdown(&mut self) -> bool {
        if !self.session.lifecycle.begin_shutdown() {
            return false;
        }
        info!("requesting backend shutdown");
        self.session.sequencer.invalidate();
        self.session.debounce.clear();
        self.status(StatusLine::info("shutting down..."));
        match tokio::time::timeout(self.settings.beacon_grace, self.backend.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "shutdown request failed"),
            Err(_) => debug!("shutdown request timed out"),
        }
        self.emit(ControllerEvent::Closed);
        true
    }
}

/// Drive the controller until the UI quits, shuts down, or drops its command sender.
pub(crate) async fn run_controller<B: Backend>(
    backend: Arc<B>,
    settings: ControllerSettings,
    marker: SkipCloseMarker,
    event_tx: UnboundedSender<ControllerEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<(u64, Completion)>();
    let mut ctl = Controller::new(backend, settings, marker, event_tx, done_tx);
    ctl.start_session();

    loop {
        let deadline = ctl.session.debounce.deadline();
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(cmd) => {
                    if ctl.handle(cmd).await.is_break() {
                        break;
                    }
                }
                None => {
                    ctl.teardown().await;
                    break;
                }
            },
            // The controller holds a sender, so this never yields None.
            Some((generation, done)) = done_rx.recv() => ctl.apply(generation, done),
            _ = ctl.heartbeat.tick() => ctl.send_heartbeat(),
            _ = sleep_until_opt(deadline) => ctl.debounce_elapsed(),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::testing::{count, FakeBackend};
    use tokio::task::JoinHandle;

    struct Harness {
        backend: Arc<FakeBackend>,
        cmd_tx: UnboundedSender<UiCommand>,
        event_rx: UnboundedReceiver<ControllerEvent>,
        handle: JoinHandle<Result<()>>,
        _state_dir: tempfile::TempDir,
    }

    impl Harness {
        fn start(settings: ControllerSettings) -> Self {
            Self::with_backend(FakeBackend::default(), settings)
        }

        fn with_backend(backend: FakeBackend, settings: ControllerSettings) -> Self {
            let backend = Arc::new(backend);
            let state_dir = tempfile::tempdir().unwrap();
            let marker = SkipCloseMarker::in_dir(state_dir.path());
            let (event_tx, event_rx) = mpsc::unbounded_channel();
            let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
            let handle = tokio::spawn(run_controller(
                backend.clone(),
                settings,
                marker,
                event_tx,
                cmd_rx,
            ));
            Self {
                backend,
                cmd_tx,
                event_rx,
                handle,
                _state_dir: state_dir,
            }
        }

        fn send(&self, cmd: UiCommand) {
            self.cmd_tx.send(cmd).unwrap();
        }

        /// Collect events up to and including the first one matching `stop`.
        async fn until(&mut self, stop: impl Fn(&ControllerEvent) -> bool) -> Vec<ControllerEvent> {
            let mut seen = Vec::new();
            loop {
                let ev = tokio::time::timeout(Duration::from_secs(600), self.event_rx.recv())
                    .await
                    .expect("timed out waiting for controller event")
                    .expect("controller event channel closed");
                let done = stop(&ev);
                seen.push(ev);
                if done {
                    return seen;
                }
            }
        }

        async fn until_preview_finished(&mut self) -> (Vec<ControllerEvent>, PreviewOutcome) {
            let seen = self
                .until(|e| matches!(e, ControllerEvent::PreviewFinished(_)))
                .await;
            let outcome = match seen.last() {
                Some(ControllerEvent::PreviewFinished(o)) => o.clone(),
                _ => unreachable!(),
            };
            (seen, outcome)
        }

        fn drain(&mut self) -> Vec<ControllerEvent> {
            let mut seen = Vec::new();
            while let Ok(ev) = self.event_rx.try_recv() {
                seen.push(ev);
            }
            seen
        }
    }

    fn views(events: &[ControllerEvent]) -> Vec<&PreviewView> {
        events
            .iter()
            .filter_map(|e| match e {
                ControllerEvent::View(v) => Some(v),
                _ => None,
            })
            .collect()
    }

    fn statuses(events: &[ControllerEvent]) -> Vec<&StatusLine> {
        events
            .iter()
            .filter_map(|e| match e {
                ControllerEvent::Status(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    fn manual() -> ControllerSettings {
        ControllerSettings {
            auto_preview: false,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn only_the_latest_of_overlapping_previews_is_applied() {
        let mut h = Harness::start(manual());
        h.backend.set_preview_delay(Duration::from_secs(1));
        for base in ["C:/a", "C:/b", "C:/c"] {
            h.send(UiCommand::Preview(FakeBackend::payload(base)));
        }

        let (seen, outcome) = h.until_preview_finished().await;
        assert_eq!(outcome, PreviewOutcome::Applied);
        let applied = views(&seen);
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].rows[0].full_path, "C:/c");
        assert!(!statuses(&seen)
            .iter()
            .any(|s| s.text == "preview canceled"));

        tokio::time::sleep(Duration::from_secs(5)).await;
        let later = h.drain();
        assert!(!later
            .iter()
            .any(|e| matches!(e, ControllerEvent::PreviewFinished(_) | ControllerEvent::View(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_reported_and_keeps_last_result() {
        let mut h = Harness::start(manual());
        h.send(UiCommand::Preview(FakeBackend::payload("C:/good")));
        let (_, outcome) = h.until_preview_finished().await;
        assert_eq!(outcome, PreviewOutcome::Applied);

        h.backend.set_preview_delay(Duration::from_secs(60));
        h.send(UiCommand::Preview(FakeBackend::payload("C:/slow")));
        let (seen, outcome) = h.until_preview_finished().await;
        assert_eq!(outcome, PreviewOutcome::TimedOut);
        assert!(views(&seen).is_empty());
        assert!(statuses(&seen)
            .iter()
            .any(|s| s.text == "preview timed out" && !s.is_error()));
    }

    #[tokio::test(start_paused = true)]
    async fn user_cancel_is_distinct_from_timeout() {
        let mut h = Harness::start(manual());
        h.backend.set_preview_delay(Duration::from_secs(10));
        h.send(UiCommand::Preview(FakeBackend::payload("C:/x")));
        tokio::time::sleep(Duration::from_secs(1)).await;
        h.send(UiCommand::CancelPreview);
        let (seen, outcome) = h.until_preview_finished().await;
        assert_eq!(outcome, PreviewOutcome::Canceled);
        assert!(views(&seen).is_empty());
        assert!(seen.iter().any(|e| matches!(e, ControllerEvent::Busy(false))));
    }

    #[tokio::test(start_paused = true)]
    async fn backend_error_clears_the_view() {
        let mut h = Harness::start(manual());
        h.backend.fail_previews(Some(ApiError::Backend {
            status: 200,
            message: "base path not found".into(),
        }));
        h.send(UiCommand::Preview(FakeBackend::payload("C:/missing")));
        let (seen, outcome) = h.until_preview_finished().await;
        assert_eq!(outcome, PreviewOutcome::Errored("base path not found".into()));
        let cleared = views(&seen);
        assert_eq!(cleared.len(), 1);
        assert!(cleared[0].is_empty());
        assert!(statuses(&seen)
            .iter()
            .any(|s| s.text == "error: base path not found"));
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_preview_is_rejected_without_a_request() {
        let mut h = Harness::start(manual());
        let payload = FormPayload {
            base_path: String::new(),
            ..FakeBackend::payload("")
        };
        h.send(UiCommand::Preview(payload));
        let (seen, outcome) = h.until_preview_finished().await;
        match outcome {
            PreviewOutcome::Rejected(errors) => {
                assert!(errors.iter().any(|e| e == "Enter a base path"))
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert!(statuses(&seen)
            .iter()
            .any(|s| s.text == "error: Enter a base path"));
        assert_eq!(count(&h.backend.preview_calls), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn auto_preview_fires_once_per_quiet_period() {
        let mut h = Harness::start(ControllerSettings::default());
        for _ in 0..5 {
            h.send(UiCommand::InputChanged(FakeBackend::payload("C:/auto")));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(count(&h.backend.preview_calls), 0);
        let (seen, outcome) = h.until_preview_finished().await;
        assert_eq!(outcome, PreviewOutcome::Applied);
        assert!(seen.iter().any(|e| matches!(e, ControllerEvent::Dirty(true))));
        assert!(seen.iter().any(|e| matches!(e, ControllerEvent::Dirty(false))));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count(&h.backend.preview_calls), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn auto_preview_stays_silent_when_form_not_ready() {
        let mut h = Harness::start(ControllerSettings::default());
        let incomplete = FormPayload {
            folders_per_day: None,
            ..FakeBackend::payload("C:/auto")
        };
        for _ in 0..3 {
            h.send(UiCommand::InputChanged(incomplete.clone()));
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count(&h.backend.preview_calls), 0);
        let seen = h.drain();
        assert!(!statuses(&seen).iter().any(|s| s.is_error()));
        assert!(!seen
            .iter()
            .any(|e| matches!(e, ControllerEvent::PreviewFinished(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_preview_cancels_pending_auto_preview() {
        let mut h = Harness::start(ControllerSettings::default());
        h.send(UiCommand::InputChanged(FakeBackend::payload("C:/auto")));
        h.send(UiCommand::Preview(FakeBackend::payload("C:/explicit")));
        let (_, outcome) = h.until_preview_finished().await;
        assert_eq!(outcome, PreviewOutcome::Applied);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count(&h.backend.preview_calls), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_pings_and_reports_health() {
        let mut h = Harness::start(manual());
        h.until(|e| matches!(e, ControllerEvent::Health(Health::Ok)))
            .await;
        assert_eq!(count(&h.backend.ping_calls), 1);

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(count(&h.backend.ping_calls), 3);

        h.backend.set_health_down(true);
        h.until(|e| matches!(e, ControllerEvent::Health(Health::Ng)))
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn config_offers_default_base_path() {
        let backend = FakeBackend::default();
        backend.set_config(ConfigInfo {
            config_path: Some("C:/cfg.json".into()),
            default_base_path: Some("D:/work".into()),
        });
        let mut h = Harness::with_backend(backend, manual());
        let seen = h
            .until(|e| matches!(e, ControllerEvent::Status(s) if s.text == "config loaded"))
            .await;
        assert!(seen
            .iter()
            .any(|e| matches!(e, ControllerEvent::ConfigPath(Some(p)) if p == "C:/cfg.json")));
        assert!(seen
            .iter()
            .any(|e| matches!(e, ControllerEvent::DefaultBasePath(p) if p == "D:/work")));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_config_reports_failure() {
        let mut h = Harness::start(manual());
        h.until(|e| matches!(e, ControllerEvent::Status(s) if s.text == "config load failed"))
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn run_requires_confirmation() {
        let mut h = Harness::start(manual());
        h.send(UiCommand::Run {
            payload: FakeBackend::payload("C:/x"),
            confirmed: false,
        });
        h.until(|e| matches!(e, ControllerEvent::Status(s) if s.text == "run not confirmed"))
            .await;
        assert_eq!(count(&h.backend.run_calls), 0);

        h.send(UiCommand::Run {
            payload: FakeBackend::payload("C:/x"),
            confirmed: true,
        });
        let seen = h
            .until(|e| matches!(e, ControllerEvent::RunFinished { .. }))
            .await;
        assert!(matches!(
            seen.last(),
            Some(ControllerEvent::RunFinished { ok: true })
        ));
        let shown = views(&seen);
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].summary.total, "4");
        assert_eq!(shown[0].summary.days, "-");
        assert!(statuses(&seen)
            .iter()
            .any(|s| s.text == "done (created: 3, skipped: 1)"));
        assert_eq!(count(&h.backend.run_calls), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn picked_folder_is_forwarded() {
        let backend = FakeBackend::default();
        backend.set_picked(PickedFolder::Path("E:/picked".into()));
        let mut h = Harness::with_backend(backend, manual());
        h.send(UiCommand::PickFolder {
            initial_path: String::new(),
        });
        h.until(|e| matches!(e, ControllerEvent::BasePathPicked(p) if p == "E:/picked"))
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn empty_base_path_is_not_saved() {
        let mut h = Harness::start(manual());
        h.send(UiCommand::SaveBasePath("   ".into()));
        h.until(|e| matches!(e, ControllerEvent::Status(s) if s.text == "error: base path is empty"))
            .await;
        h.send(UiCommand::SaveBasePath("D:/work".into()));
        h.until(|e| matches!(e, ControllerEvent::Status(s) if s.text == "base path saved"))
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn quit_sends_close_once() {
        let mut h = Harness::start(manual());
        h.send(UiCommand::Quit);
        h.until(|e| matches!(e, ControllerEvent::Closed)).await;
        h.handle.await.unwrap().unwrap();
        assert_eq!(count(&h.backend.close_calls), 1);
        assert_eq!(count(&h.backend.shutdown_calls), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reload_skips_close_for_that_teardown_only() {
        let mut h = Harness::start(manual());
        h.send(UiCommand::Reload);
        h.until(|e| matches!(e, ControllerEvent::SessionRestarted))
            .await;
        assert_eq!(count(&h.backend.close_calls), 0);

        h.send(UiCommand::Quit);
        h.until(|e| matches!(e, ControllerEvent::Closed)).await;
        assert_eq!(count(&h.backend.close_calls), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_sends_distinct_signal_and_stops() {
        let mut h = Harness::start(manual());
        h.send(UiCommand::Shutdown);
        h.until(|e| matches!(e, ControllerEvent::Closed)).await;
        h.handle.await.unwrap().unwrap();
        assert_eq!(count(&h.backend.shutdown_calls), 1);
        assert_eq!(count(&h.backend.close_calls), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_ui_tears_down() {
        let Harness {
            backend,
            cmd_tx,
            handle,
            ..
        } = Harness::start(manual());
        drop(cmd_tx);
        handle.await.unwrap().unwrap();
        assert_eq!(count(&backend.close_calls), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_shutdown_does_not_block_exit() {
        let backend = FakeBackend::default();
        backend.hang_shutdown();
        let h = Harness::with_backend(backend, manual());
        h.send(UiCommand::Shutdown);
        h.send(UiCommand::Quit);
        let Harness {
            backend,
            cmd_tx,
            handle,
            ..
        } = h;
        drop(cmd_tx);
        tokio::time::timeout(Duration::from_secs(60), handle)
            .await
            .expect("controller stuck on shutdown")
            .unwrap()
            .unwrap();
        assert_eq!(count(&backend.shutdown_calls), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_health_check_reports_ng_before_next_tick() {
        let backend = FakeBackend::default();
        backend.hang_health();
        let mut h = Harness::with_backend(backend, manual());
        let started = Instant::now();
        h.until(|e| matches!(e, ControllerEvent::Health(Health::Ng)))
            .await;
        assert!(started.elapsed() < ControllerSettings::default().keepalive_interval);
    }

    #[tokio::test(start_paused = true)]
    async fn run_started_before_reload_is_dropped() {
        let backend = FakeBackend::default();
        backend.set_run_delay(Duration::from_secs(2));
        let mut h = Harness::with_backend(backend, manual());
        h.send(UiCommand::Run {
            payload: FakeBackend::payload("C:/x"),
            confirmed: true,
        });
        h.send(UiCommand::Reload);
        h.until(|e| matches!(e, ControllerEvent::SessionRestarted))
            .await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        let later = h.drain();
        assert_eq!(count(&h.backend.run_calls), 1);
        assert!(!later
            .iter()
            .any(|e| matches!(e, ControllerEvent::RunFinished { .. })));
        assert!(!statuses(&later)
            .iter()
            .any(|s| s.text.starts_with("done")));
    }

    #[tokio::test(start_paused = true)]
    async fn one_shot_exit_skips_close_notice() {
        let mut h = Harness::start(ControllerSettings {
            close_on_exit: false,
            ..manual()
        });
        h.send(UiCommand::Quit);
        h.until(|e| matches!(e, ControllerEvent::Closed)).await;
        h.handle.await.unwrap().unwrap();
        assert_eq!(count(&h.backend.close_calls), 0);
    }
}

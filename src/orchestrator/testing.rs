//! Scripted in-memory backend for controller tests.

use crate::api::{ApiError, Backend};
use crate::model::{
    ConfigInfo, FormPayload, Mode, PickedFolder, PlanItem, PreviewResult, RunReport, Summary,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Default)]
pub(crate) struct FakeBackend {
    preview_delay: Mutex<Duration>,
    preview_error: Mutex<Option<ApiError>>,
    config: Mutex<Option<ConfigInfo>>,
    picked: Mutex<Option<PickedFolder>>,
    health_down: AtomicBool,
    health_hangs: AtomicBool,
    shutdown_hangs: AtomicBool,
    run_delay: Mutex<Duration>,
    pub preview_calls: AtomicUsize,
    pub run_calls: AtomicUsize,
    pub ping_calls: AtomicUsize,
    pub health_calls: AtomicUsize,
    pub close_calls: AtomicUsize,
    pub shutdown_calls: AtomicUsize,
}

pub(crate) fn count(c: &AtomicUsize) -> usize {
    c.load(Ordering::SeqCst)
}

impl FakeBackend {
    /// A valid range payload; the fake echoes `base_path` back as the item path.
    pub fn payload(base_path: &str) -> FormPayload {
        FormPayload {
            base_path: base_path.into(),
            mode: Mode::Range,
            start_date: "2024-01-01".into(),
            end_date: Some("2024-01-03".into()),
            days_to_make: None,
            folders_per_day: Some(5),
            first_day_start_index: Some(1),
        }
    }

    pub fn set_preview_delay(&self, d: Duration) {
        *self.preview_delay.lock().unwrap() = d;
    }

    pub fn fail_previews(&self, e: Option<ApiError>) {
        *self.preview_error.lock().unwrap() = e;
    }

    pub fn set_config(&self, info: ConfigInfo) {
        *self.config.lock().unwrap() = Some(info);
    }

    pub fn set_picked(&self, picked: PickedFolder) {
        *self.picked.lock().unwrap() = Some(picked);
    }

    pub fn set_health_down(&self, down: bool) {
        self.health_down.store(down, Ordering::SeqCst);
    }

    /// Health checks never answer.
    pub fn hang_health(&self) {
        self.health_hangs.store(true, Ordering::SeqCst);
    }

    /// Shutdown requests never answer.
    pub fn hang_shutdown(&self) {
        self.shutdown_hangs.store(true, Ordering::SeqCst);
    }

    pub fn set_run_delay(&self, d: Duration) {
        *self.run_delay.lock().unwrap() = d;
    }

    fn echo_items(payload: &FormPayload) -> Vec<PlanItem> {
        vec![PlanItem {
            kind: Some("Day".into()),
            date: payload.start_date.clone().into(),
            folder_name: Some("01".into()),
            action: Some("Create".into()),
            result: None,
            full_path: Some(payload.base_path.clone()),
        }]
    }
}

impl Backend for FakeBackend {
    async fn load_config(&self) -> Result<ConfigInfo, ApiError> {
        let config = self.config.lock().unwrap().clone();
        config.ok_or_else(|| ApiError::Backend {
            status: 200,
            message: "HTTP 200".into(),
        })
    }

    async fn save_base_path(&self, base_path: &str) -> Result<Option<String>, ApiError> {
        Ok(Some(format!("{base_path}/config.json")))
    }

    async fn health(&self) -> Result<(), ApiError> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        if self.health_hangs.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        if self.health_down.load(Ordering::SeqCst) {
            Err(ApiError::Transport("connection refused".into()))
        } else {
            Ok(())
        }
    }

    async fn preview(&self, payload: &FormPayload) -> Result<PreviewResult, ApiError> {
        self.preview_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.preview_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        let error = self.preview_error.lock().unwrap().clone();
        if let Some(e) = error {
            return Err(e);
        }
        Ok(PreviewResult {
            items: Self::echo_items(payload),
            summary: Some(Summary {
                days: Some(1),
                total: 1,
                create: 1,
                skip: 0,
            }),
        })
    }

    async fn run(&self, payload: &FormPayload) -> Result<RunReport, ApiError> {
        self.run_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.run_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        Ok(RunReport {
            items: Self::echo_items(payload),
            created: 3,
            skipped: 1,
        })
    }

    async fn pick_folder(&self, _initial_path: &str) -> Result<PickedFolder, ApiError> {
        let picked = self.picked.lock().unwrap().clone();
        Ok(picked.unwrap_or(PickedFolder::Canceled))
    }

    async fn open_folder(&self, _path: &str) -> Result<(), ApiError> {
        Ok(())
    }

    async fn ping(&self) -> Result<(), ApiError> {
        self.ping_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self, _grace: Duration) -> Result<(), ApiError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ApiError> {
        self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
        if self.shutdown_hangs.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        Ok(())
    }
}

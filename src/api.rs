//! Client for the local folder backend.
//!
//! Every endpoint answers with a JSON envelope carrying `ok` and, on failure,
//! an `errors` array. [`decode_envelope`] turns status + body into either the
//! envelope value or an [`ApiError`] whose `Display` is the user-facing message.

use crate::model::{ConfigInfo, FormPayload, PickedFolder, PreviewResult, RunReport};
use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The request never produced an HTTP response.
    #[error("{0}")]
    Transport(String),
    /// Non-2xx status or `ok:false`; `message` is the first backend error or `HTTP <status>`.
    #[error("{message}")]
    Backend { status: u16, message: String },
    /// The body was not JSON or did not have the expected shape.
    #[error("invalid json response")]
    Parse { detail: String },
    #[error("request timed out")]
    Timeout,
    #[error("request canceled")]
    Canceled,
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

/// The backend operations the controller depends on.
pub trait Backend: Send + Sync + 'static {
    fn load_config(&self) -> impl Future<Output = Result<ConfigInfo, ApiError>> + Send;
    /// Persist the base path; yields the config file path when the backend reports one.
    fn save_base_path(
        &self,
        base_path: &str,
    ) -> impl Future<Output = Result<Option<String>, ApiError>> + Send;
    fn health(&self) -> impl Future<Output = Result<(), ApiError>> + Send;
    fn preview(
        &self,
        payload: &FormPayload,
    ) -> impl Future<Output = Result<PreviewResult, ApiError>> + Send;
    fn run(&self, payload: &FormPayload)
        -> impl Future<Output = Result<RunReport, ApiError>> + Send;
    fn pick_folder(
        &self,
        initial_path: &str,
    ) -> impl Future<Output = Result<PickedFolder, ApiError>> + Send;
    fn open_folder(&self, path: &str) -> impl Future<Output = Result<(), ApiError>> + Send;
    fn ping(&self) -> impl Future<Output = Result<(), ApiError>> + Send;
    /// Beacon-style session end notice. Gives up silently after `grace`.
    fn close(&self, grace: Duration) -> impl Future<Output = Result<(), ApiError>> + Send;
    fn shutdown(&self) -> impl Future<Output = Result<(), ApiError>> + Send;
}

fn parse_body(body: &[u8]) -> Result<Value, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::Parse {
        detail: e.to_string(),
    })
}

fn first_error(v: &Value) -> Option<String> {
    v.get("errors")
        .and_then(Value::as_array)
        .and_then(|errs| errs.first())
        .map(|e| match e.as_str() {
            Some(s) => s.to_string(),
            None => e.to_string(),
        })
}

fn check_envelope(status: u16, v: &Value) -> Result<(), ApiError> {
    let success = (200..300).contains(&status);
    let ok = v.get("ok").and_then(Value::as_bool).unwrap_or(false);
    if success && ok {
        return Ok(());
    }
    Err(ApiError::Backend {
        status,
        message: first_error(v).unwrap_or_else(|| format!("HTTP {status}")),
    })
}

/// Decode a response into its envelope, or the error the user should see.
pub fn decode_envelope(status: u16, body: &[u8]) -> Result<Value, ApiError> {
    let v = parse_body(body)?;
    check_envelope(status, &v)?;
    Ok(v)
}

fn from_envelope<T: DeserializeOwned>(v: Value) -> Result<T, ApiError> {
    serde_json::from_value(v).map_err(|e| ApiError::Parse {
        detail: e.to_string(),
    })
}

fn decode_config(v: &Value) -> ConfigInfo {
    ConfigInfo {
        config_path: v
            .get("configPath")
            .and_then(Value::as_str)
            .map(str::to_string),
        default_base_path: v
            .get("config")
            .and_then(|c| c.get("DefaultBasePath"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
    }
}

/// Folder picker responses report a user cancel as `canceled:true`, with or without `ok`.
pub fn decode_picked_folder(status: u16, body: &[u8]) -> Result<PickedFolder, ApiError> {
    let v = parse_body(body)?;
    if v.get("canceled").and_then(Value::as_bool) == Some(true) {
        return Ok(PickedFolder::Canceled);
    }
    check_envelope(status, &v)?;
    match v.get("path").and_then(Value::as_str) {
        Some(p) if !p.is_empty() => Ok(PickedFolder::Path(p.to_string())),
        _ => Ok(PickedFolder::Canceled),
    }
}

fn timestamp_body() -> Value {
    let ts = time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "now".into());
    json!({ "ts": ts })
}

/// HTTP implementation of [`Backend`] on top of `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    http: reqwest::Client,
    base: reqwest::Url,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let base = reqwest::Url::parse(base_url)
            .with_context(|| format!("invalid backend url: {base_url}"))?;
        let http = reqwest::Client::builder()
            .user_agent(format!("dated-folders/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build http client")?;
        Ok(Self { http, base })
    }

    fn url(&self, path: &str) -> Result<reqwest::Url, ApiError> {
        self.base
            .join(path)
            .map_err(|e| ApiError::Transport(format!("bad endpoint {path}: {e}")))
    }

    async fn get(&self, path: &str) -> Result<(u16, Vec<u8>), ApiError> {
        let resp = self.http.get(self.url(path)?).send().await?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await?;
        Ok((status, body.to_vec()))
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(u16, Vec<u8>), ApiError> {
        let resp = self.http.post(self.url(path)?).json(body).send().await?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await?;
        Ok((status, body.to_vec()))
    }

    async fn post_envelope<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Value, ApiError> {
        let (status, bytes) = self.post(path, body).await?;
        decode_envelope(status, &bytes)
    }
}

impl Backend for HttpBackend {
    async fn load_config(&self) -> Result<ConfigInfo, ApiError> {
        let (status, bytes) = self.get("/api/config").await?;
        let v = decode_envelope(status, &bytes)?;
        Ok(decode_config(&v))
    }

    async fn save_base_path(&self, base_path: &str) -> Result<Option<String>, ApiError> {
        let v = self
            .post_envelope("/api/config/basePath", &json!({ "basePath": base_path }))
            .await?;
        Ok(decode_config(&v).config_path)
    }

    async fn health(&self) -> Result<(), ApiError> {
        let (status, bytes) = self.get("/api/health").await?;
        decode_envelope(status, &bytes).map(|_| ())
    }

    async fn preview(&self, payload: &FormPayload) -> Result<PreviewResult, ApiError> {
        let v = self.post_envelope("/api/preview", payload).await?;
        from_envelope(v)
    }

    async fn run(&self, payload: &FormPayload) -> Result<RunReport, ApiError> {
        let v = self.post_envelope("/api/run", payload).await?;
        from_envelope(v)
    }

    async fn pick_folder(&self, initial_path: &str) -> Result<PickedFolder, ApiError> {
        let (status, bytes) = self
            .post("/api/pickFolder", &json!({ "initialPath": initial_path }))
            .await?;
        decode_picked_folder(status, &bytes)
    }

    async fn open_folder(&self, path: &str) -> Result<(), ApiError> {
        self.post_envelope("/api/openFolder", &json!({ "path": path }))
            .await
            .map(|_| ())
    }

    async fn ping(&self) -> Result<(), ApiError> {
        self.post("/api/ping", &json!({})).await.map(|_| ())
    }

    async fn close(&self, grace: Duration) -> Result<(), ApiError> {
        let body = timestamp_body();
        let send = self.post("/api/close", &body);
        match tokio::time::timeout(grace, send).await {
            Ok(res) => res.map(|_| ()),
            Err(_) => Err(ApiError::Timeout),
        }
    }

    async fn shutdown(&self) -> Result<(), ApiError> {
        self.post("/api/shutdown", &timestamp_body()).await.map(|_| ())
    }
}

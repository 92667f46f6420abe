//! Preview request sequencing.
//!
//! Every preview trigger takes a fresh epoch and cancels whatever was in flight.
//! A completion is only applied when its epoch is still the newest one; anything
//! older is dropped without touching the view or the status line.

use super::cancel::CancelToken;
use crate::api::{ApiError, Backend};
use crate::model::{FormPayload, PreviewOutcome, PreviewResult};
use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) struct PreviewTicket {
    pub epoch: u64,
    pub cancel: CancelToken,
}

/// What the controller must do with a finished preview.
#[derive(Debug)]
pub(crate) enum Settlement {
    Apply(PreviewResult),
    Superseded,
    TimedOut,
    Canceled,
    Errored(String),
}

impl Settlement {
    /// User-visible outcome; `None` for superseded attempts, which stay silent.
    pub fn outcome(&self) -> Option<PreviewOutcome> {
        match self {
            Settlement::Apply(_) => Some(PreviewOutcome::Applied),
            Settlement::Superseded => None,
            Settlement::TimedOut => Some(PreviewOutcome::TimedOut),
            Settlement::Canceled => Some(PreviewOutcome::Canceled),
            Settlement::Errored(msg) => Some(PreviewOutcome::Errored(msg.clone())),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct PreviewSequencer {
    epoch: u64,
    in_flight: Option<PreviewTicket>,
}

impl PreviewSequencer {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Start a new attempt, cancelling the previous one if it is still outstanding.
    pub fn begin(&mut self) -> PreviewTicket {
        self.epoch += 1;
        if let Some(prev) = self.in_flight.take() {
            prev.cancel.cancel();
        }
        let ticket = PreviewTicket {
            epoch: self.epoch,
            cancel: CancelToken::new(),
        };
        self.in_flight = Some(ticket.clone());
        ticket
    }

    /// User-requested cancel of the current attempt. Its completion still settles normally.
    pub fn cancel_current(&self) -> bool {
        match &self.in_flight {
            Some(t) => {
                t.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Make every outstanding attempt stale, e.g. on session restart or teardown.
    pub fn invalidate(&mut self) {
        self.epoch += 1;
        if let Some(prev) = self.in_flight.take() {
            prev.cancel.cancel();
        }
    }

    pub fn settle(&mut self, epoch: u64, result: Result<PreviewResult, ApiError>) -> Settlement {
        if epoch != self.epoch {
            return Settlement::Superseded;
        }
        self.in_flight = None;
        match result {
            Ok(r) => Settlement::Apply(r),
            Err(ApiError::Timeout) => Settlement::TimedOut,
            Err(ApiError::Canceled) => Settlement::Canceled,
            Err(e) => Settlement::Errored(e.to_string()),
        }
    }
}

/// Issue one preview bounded by `timeout` and abandoned as soon as `cancel` fires.
///
/// A timeout cancels the token itself so the two outcomes stay distinguishable.
pub(crate) async fn execute_preview<B: Backend>(
    backend: &B,
    payload: &FormPayload,
    cancel: &CancelToken,
    timeout: Duration,
) -> Result<PreviewResult, ApiError> {
    if cancel.is_cancelled() {
        return Err(ApiError::Canceled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ApiError::Canceled),
        res = tokio::time::timeout(timeout, backend.preview(payload)) => match res {
            Ok(r) => r,
            Err(_) => {
                cancel.cancel();
                Err(ApiError::Timeout)
            }
        },
    }
}

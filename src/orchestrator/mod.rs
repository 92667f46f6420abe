//! Application-level orchestration.
//!
//! This module owns the preview/run request lifecycle (sequencing, cancellation,
//! timeouts, auto-preview debounce) and session lifecycle signaling. UI/CLI layers
//! send [`UiCommand`]s in and receive `ControllerEvent`s back.

mod cancel;
mod controller;
mod debounce;
mod lifecycle;
mod sequencer;
#[cfg(test)]
mod testing;

pub(crate) use controller::{run_controller, UiCommand};
pub(crate) use lifecycle::SkipCloseMarker;

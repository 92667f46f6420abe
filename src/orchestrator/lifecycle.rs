//! Session boundary bookkeeping: which close/reload/shutdown signals were already sent.

use std::path::{Path, PathBuf};
use tracing::debug;

const SKIP_CLOSE_FILE: &str = "skip-close-once";

/// One-shot marker, persisted on disk, telling the next teardown it is a reload.
#[derive(Debug, Clone)]
pub(crate) struct SkipCloseMarker {
    path: PathBuf,
}

impl SkipCloseMarker {
    pub fn in_dir(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(SKIP_CLOSE_FILE),
        }
    }

    /// Failures are logged and otherwise ignored; the marker is best-effort.
    pub fn arm(&self) {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                debug!(error = %e, "create state dir for skip-close marker");
                return;
            }
        }
        if let Err(e) = std::fs::write(&self.path, b"1") {
            debug!(error = %e, path = %self.path.display(), "arm skip-close marker");
        }
    }

    /// Returns whether the marker was armed, clearing it.
    pub fn consume(&self) -> bool {
        match std::fs::remove_file(&self.path) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                debug!(error = %e, path = %self.path.display(), "clear skip-close marker");
                false
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LifecycleFlags {
    pub close_requested: bool,
    pub reload_requested: bool,
    pub shutdown_requested: bool,
}

/// Per-session lifecycle state. A session restart builds a fresh one.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    flags: LifecycleFlags,
    marker: SkipCloseMarker,
}

impl Lifecycle {
    pub fn new(marker: SkipCloseMarker) -> Self {
        Self {
            flags: LifecycleFlags::default(),
            marker,
        }
    }

    pub fn flags(&self) -> LifecycleFlags {
        self.flags
    }

    /// Decide whether this teardown sends the close notice. True at most once per session.
    ///
    /// A pending reload marker suppresses the notice for this teardown only and is cleared.
    pub fn should_send_close(&mut self) -> bool {
        let reloading = self.marker.consume();
        if self.flags.close_requested || self.flags.reload_requested || reloading {
            return false;
        }
        self.flags.close_requested = true;
        true
    }

    pub fn begin_reload(&mut self) {
        self.flags.reload_requested = true;
        self.marker.arm();
    }

    /// True the first time only. Shutdown implies the close notice is not sent separately.
    pub fn begin_shutdown(&mut self) -> bool {
        if self.flags.shutdown_requested {
            return false;
        }
        self.flags.shutdown_requested = true;
        self.flags.close_requested = true;
        true
    }

    /// Fresh flags for the next session, same marker location.
    pub fn restarted(&self) -> Self {
        Self::new(self.marker.clone())
    }
}

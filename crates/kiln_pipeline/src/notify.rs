//! Hotload notification: delivering converged import batches to listeners.

use std::path::Path;

use kiln_asset::AssetKind;
use parking_lot::Mutex;

/// One imported asset, delivered to listeners after convergence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEvent {
    /// Canonical asset name, e.g. `textures_icon`.
    pub name: String,
    /// Asset kind.
    pub kind: AssetKind,
}

/// Receiver of pipeline notifications (editor UI, live game client).
pub trait ImportListener: Send + Sync {
    /// A convergence round completed; `events` holds the imported assets in
    /// job-completion order. Called at most once per round.
    fn assets_changed(&self, events: &[ImportEvent]);

    /// An import job failed. The asset stays stale and is retried on its
    /// next detected change.
    fn import_failed(&self, _path: &Path, _error: &str) {}
}

/// Fan-out of pipeline notifications to registered listeners.
#[derive(Default)]
pub struct Notifier {
    listeners: Mutex<Vec<Box<dyn ImportListener>>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener.
    pub fn add_listener(&self, listener: Box<dyn ImportListener>) {
        self.listeners.lock().push(listener);
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Deliver one converged batch. Skipped when the batch is empty.
    pub fn flush(&self, events: &[ImportEvent]) {
        if events.is_empty() {
            return;
        }
        log::info!("flushing {} import events to listeners", events.len());
        for listener in self.listeners.lock().iter() {
            listener.assets_changed(events);
        }
    }

    /// Deliver a failure notification.
    pub fn notify_failure(&self, path: &Path, error: &str) {
        for listener in self.listeners.lock().iter() {
            listener.import_failed(path, error);
        }
    }
}

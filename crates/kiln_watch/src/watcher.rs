//! Background thread driving the scan pass on a fixed interval.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::queue::EventQueue;
use crate::scan::ScanState;

/// Watcher configuration.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Absolute directories to recurse into. Fixed for the watcher's lifetime.
    pub roots: Vec<PathBuf>,
    /// Delay between reconciliation passes.
    pub interval: Duration,
    /// Modification-time tolerance absorbing filesystem quantization.
    pub tolerance: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            interval: Duration::from_millis(500),
            tolerance: Duration::from_millis(4),
        }
    }
}

/// Polling watcher thread.
///
/// The thread is the sole writer of its [`ScanState`]; all output flows
/// through the shared [`EventQueue`]. Stopping sets a flag and joins; the
/// thread finishes its current pass rather than being interrupted.
pub struct DirWatcher {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl DirWatcher {
    /// Spawn the watcher thread. The first pass runs immediately and emits
    /// `Added` for every pre-existing file under the roots.
    pub fn spawn(config: WatchConfig, queue: Arc<EventQueue>) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let thread = std::thread::Builder::new()
            .name("kiln-watcher".to_string())
            .spawn(move || {
                log::info!(
                    "watching {} roots (interval {:?})",
                    config.roots.len(),
                    config.interval
                );
                let mut scan = ScanState::new();
                while !stop_flag.load(Ordering::Relaxed) {
                    scan.poll_once(&config.roots, config.tolerance, &queue);

                    // Sleep in slices so stop requests are honored promptly.
                    let mut remaining = config.interval;
                    let slice = Duration::from_millis(50);
                    while remaining > Duration::ZERO && !stop_flag.load(Ordering::Relaxed) {
                        let step = remaining.min(slice);
                        std::thread::sleep(step);
                        remaining = remaining.saturating_sub(step);
                    }
                }
                log::info!("watcher stopped");
            })?;

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    /// Request a stop and join the thread.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for DirWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

//! # Kiln Watch
//!
//! Polling file watcher for the asset import pipeline.
//!
//! The watcher deliberately polls instead of using native filesystem
//! notifications: every pass is a full reconciliation of a snapshot map
//! against the directory tree, so a missed or batched event can never leave
//! the pipeline permanently out of sync.
//!
//! - [`EventQueue`]: bounded queue with drop-oldest overflow, the only
//!   channel between the watcher thread and the scheduler.
//! - [`ScanState`]: the snapshot map plus the diffing pass, usable without
//!   a thread (tests, one-shot builds).
//! - [`DirWatcher`]: the background thread driving [`ScanState`] on a fixed
//!   interval.

pub mod queue;
pub mod scan;
pub mod watcher;

pub use queue::EventQueue;
pub use scan::{FileChangeEvent, FileChangeKind, FileRecord, ScanState};
pub use watcher::{DirWatcher, WatchConfig};

//! # Kiln Pipeline
//!
//! The asset import pipeline: watches source directories, decides which
//! assets are stale relative to their compiled targets, schedules re-import
//! work on background jobs, and notifies listeners only once all in-flight
//! work has converged.
//!
//! Data flow:
//!
//! ```text
//! watcher thread ──► event queue ──► ImportPipeline::update()
//!                                         │ staleness check + dedupe
//!                                         ▼
//!                                   worker jobs (importers)
//!                                         │ completion handles
//!                                         ▼
//!                          convergence barrier ──► manifest job
//!                                         │ on completion
//!                                         ▼
//!                          flush ImportEvents to listeners
//! ```
//!
//! Everything is owned by an explicit [`ImportPipeline`] instance; there is
//! no process-global state, so tests construct as many pipelines as they
//! need.

pub mod config;
pub mod manifest;
pub mod notify;
pub mod scheduler;
pub mod stale;

pub use config::PipelineConfig;
pub use manifest::regenerate;
pub use notify::{ImportEvent, ImportListener, Notifier};
pub use scheduler::ImportPipeline;
pub use stale::needs_import;

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Asset(#[from] kiln_asset::AssetError),

    #[error("manifest serialization failed: {0}")]
    ManifestJson(#[from] serde_json::Error),

    #[error("path {0:?} is not under any watch root")]
    OutsideRoots(PathBuf),
}

//! Import scheduler: dedupe, background jobs, and the convergence barrier.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use kiln_asset::{
    meta_companion, meta_path, target_path, AssetError, AssetId, AssetRecord, AssetRegistry,
    ImportError, Properties, SidecarMeta,
};
use kiln_jobs::{JobError, JobHandle, JobSystem};
use kiln_watch::{DirWatcher, EventQueue, FileChangeEvent, FileChangeKind, WatchConfig};
use parking_lot::{Mutex, MutexGuard};

use crate::config::PipelineConfig;
use crate::notify::{ImportEvent, ImportListener, Notifier};
use crate::stale::needs_import;
use crate::PipelineError;

struct ActiveJob {
    handle: JobHandle,
    /// A request arrived while this job was in flight; re-check staleness
    /// once it completes instead of spawning a duplicate.
    requeue: bool,
}

/// A pending convergence round: its manifest job plus the batch snapshot
/// taken when the round was scheduled. Events from jobs spawned after that
/// point stay accumulated for the next round, so a batch is exactly the
/// work that converged in its own round.
struct Round {
    handle: JobHandle,
    events: Vec<ImportEvent>,
    failures: Vec<(PathBuf, String)>,
}

/// Bookkeeping shared by job enqueue, reap, and barrier scheduling.
///
/// One mutex guards all three so a job can never slip into a closing
/// convergence round unobserved: an enqueue racing the barrier check lands
/// in the next round via `dirty`.
struct SchedulerState {
    active: HashMap<AssetId, ActiveJob>,
    barrier: Option<Round>,
    /// A convergence round is owed (work was enqueued, or a deletion needs
    /// a prune + manifest pass).
    dirty: bool,
}

/// The asset import pipeline.
///
/// One instance owns its watcher, event queue, job pool, and registry;
/// construct one per process (or per test). `update()` is the host tick and
/// must be called from a single thread; the watcher and the workers only
/// communicate back through thread-safe channels and handles.
pub struct ImportPipeline {
    config: PipelineConfig,
    registry: Mutex<AssetRegistry>,
    queue: Arc<EventQueue>,
    jobs: JobSystem,
    watcher: Mutex<Option<DirWatcher>>,
    state: Mutex<SchedulerState>,
    /// Import events accumulated since the last round snapshot, completion
    /// order.
    completed: Arc<Mutex<Vec<ImportEvent>>>,
    /// Failure notifications accumulated since the last round snapshot.
    failures: Arc<Mutex<Vec<(PathBuf, String)>>>,
    failed_imports: Arc<AtomicU64>,
    notifier: Notifier,
}

impl ImportPipeline {
    /// Pipeline with the built-in importer set.
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_registry(config, AssetRegistry::with_default_importers())
    }

    /// Pipeline with a caller-supplied registry (custom importers).
    pub fn with_registry(config: PipelineConfig, registry: AssetRegistry) -> Self {
        let queue = Arc::new(EventQueue::new(config.queue_capacity));
        let jobs = JobSystem::new(config.workers);
        Self {
            registry: Mutex::new(registry),
            queue,
            jobs,
            watcher: Mutex::new(None),
            state: Mutex::new(SchedulerState {
                active: HashMap::new(),
                barrier: None,
                dirty: false,
            }),
            completed: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(Vec::new())),
            failed_imports: Arc::new(AtomicU64::new(0)),
            notifier: Notifier::new(),
            config,
        }
    }

    /// Pipeline configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The shared change-event queue (tests push events directly).
    pub fn event_queue(&self) -> Arc<EventQueue> {
        self.queue.clone()
    }

    /// Locked access to the registry.
    pub fn registry(&self) -> MutexGuard<'_, AssetRegistry> {
        self.registry.lock()
    }

    /// Register a hotload/editor listener.
    pub fn add_listener(&self, listener: Box<dyn ImportListener>) {
        self.notifier.add_listener(listener);
    }

    /// Total import jobs that have failed since construction.
    pub fn failed_import_count(&self) -> u64 {
        self.failed_imports.load(Ordering::Relaxed)
    }

    /// Start the background watcher thread over the configured roots.
    pub fn start_watcher(&self) -> std::io::Result<()> {
        let watch = WatchConfig {
            roots: self.config.roots.clone(),
            interval: self.config.watch_interval,
            tolerance: self.config.tolerance,
        };
        *self.watcher.lock() = Some(DirWatcher::spawn(watch, self.queue.clone())?);
        Ok(())
    }

    /// Stop and join the watcher thread, if running.
    pub fn stop_watcher(&self) {
        if let Some(mut watcher) = self.watcher.lock().take() {
            watcher.stop();
        }
    }

    /// Resolve `path` to an asset, run the staleness oracle, and schedule an
    /// import job if stale. Returns whether a job was scheduled.
    ///
    /// Requests for an asset already in flight are coalesced: the in-flight
    /// job gets a requeue mark and staleness is re-checked after it
    /// completes, so nothing is duplicated and nothing is lost.
    pub fn request_import(&self, path: &Path) -> Result<bool, PipelineError> {
        // Never treat compiled output as source.
        if path.starts_with(&self.config.output_dir) {
            return Ok(false);
        }
        let root = self
            .config
            .root_of(path)
            .ok_or_else(|| PipelineError::OutsideRoots(path.to_path_buf()))?
            .to_path_buf();

        let record = {
            let mut registry = self.registry.lock();
            match registry.resolve_or_insert(path, &root) {
                Ok(id) => {
                    registry.refresh_priority(id);
                    registry.get(id).cloned()
                }
                Err(AssetError::UnknownExtension(_)) => None,
                Err(e) => return Err(e.into()),
            }
        };

        match record {
            Some(record) => self.schedule_if_stale(&record),
            None => {
                // Not an asset itself; re-import anything that declares it
                // as an input. The staleness oracle cannot see dependency
                // files, so these imports are forced.
                let dependents = self.registry.lock().dependents_of(path);
                let mut any = false;
                for id in dependents {
                    any |= self.request_import_id(id, true)?;
                }
                Ok(any)
            }
        }
    }

    fn request_import_id(&self, id: AssetId, force: bool) -> Result<bool, PipelineError> {
        let record = self.registry.lock().get(id).cloned();
        match record {
            Some(record) => self.schedule(&record, force),
            None => Ok(false),
        }
    }

    fn schedule_if_stale(&self, record: &AssetRecord) -> Result<bool, PipelineError> {
        self.schedule(record, false)
    }

    fn schedule(&self, record: &AssetRecord, force: bool) -> Result<bool, PipelineError> {
        let target = target_path(&self.config.output_dir, record.kind, &record.relative_path);
        let meta = meta_path(&record.source_path);
        if !force && !needs_import(&record.source_path, &meta, &target, &self.config.config_path) {
            return Ok(false);
        }

        // The record resolved through an importer, so this lookup holds
        // unless the importer table changed since; then there is no work.
        let import = match self.registry.lock().importer_for(record).map(|i| i.import) {
            Some(import) => import,
            None => return Ok(false),
        };

        let mut state = self.state.lock();
        if let Some(active) = state.active.get_mut(&record.id) {
            log::debug!("coalescing re-import request for '{}'", record.canonical_name);
            active.requeue = true;
            return Ok(false);
        }

        let job = import_job(
            record.clone(),
            target,
            import,
            self.config.props.clone(),
            self.completed.clone(),
            self.failures.clone(),
            self.failed_imports.clone(),
        );
        let handle = self
            .jobs
            .spawn(&format!("import {}", record.canonical_name), job);
        state.active.insert(
            record.id,
            ActiveJob {
                handle,
                requeue: false,
            },
        );
        state.dirty = true;
        Ok(true)
    }

    /// Pop all queued file-change events and convert them into import
    /// requests. `.meta` changes retarget to the companion asset path.
    pub fn drain_events(&self) {
        while let Some(event) = self.queue.pop() {
            self.handle_change(&event);
        }
    }

    fn handle_change(&self, event: &FileChangeEvent) {
        let path = meta_companion(&event.path).unwrap_or_else(|| event.path.clone());

        let source_deleted = event.kind == FileChangeKind::Deleted && path == event.path;
        if source_deleted {
            // The registry prune and manifest regeneration happen in the
            // next convergence round; no job to run.
            if self.registry.lock().get_by_path(&path).is_some() {
                self.state.lock().dirty = true;
            }
            return;
        }

        if let Err(e) = self.request_import(&path) {
            log::debug!("ignoring change for {:?}: {}", path, e);
        }
    }

    /// Host tick: drain events, advance the convergence barrier, reap
    /// finished jobs, and schedule the post-import round when the job set
    /// has drained. Non-blocking; call once per frame from one thread.
    pub fn update(&self) {
        self.drain_events();

        // A pending round either blocks this tick or, once its manifest job
        // finished, flushes its snapshotted batch.
        let closed = {
            let mut state = self.state.lock();
            match state.barrier.as_ref().map(|r| r.handle.is_done()) {
                Some(false) => return,
                Some(true) => state.barrier.take(),
                None => None,
            }
        };
        if let Some(round) = closed {
            self.flush(round);
        }

        // Reap finished jobs; coalesced requests get their re-check now.
        let requeue: Vec<AssetId> = {
            let mut state = self.state.lock();
            let mut ids = Vec::new();
            state.active.retain(|id, job| {
                if job.handle.is_done() {
                    if job.requeue {
                        ids.push(*id);
                    }
                    false
                } else {
                    true
                }
            });
            ids
        };
        for id in requeue {
            if let Err(e) = self.request_import_id(id, false) {
                log::debug!("requeue for asset {:?} dropped: {}", id, e);
            }
        }

        let mut state = self.state.lock();
        if !state.active.is_empty() {
            return;
        }
        if state.dirty && state.barrier.is_none() {
            state.dirty = false;
            // Snapshot the batch now; a job spawned while the manifest job
            // runs reports into the next round.
            let events = std::mem::take(&mut *self.completed.lock());
            let failures = std::mem::take(&mut *self.failures.lock());
            let output_dir = self.config.output_dir.clone();
            let manifest_path = self.config.manifest_path.clone();
            let handle = self.jobs.spawn("regenerate manifest", move || {
                crate::manifest::regenerate(&output_dir, &manifest_path).map_err(JobError::failed)
            });
            state.barrier = Some(Round {
                handle,
                events,
                failures,
            });
        }
    }

    /// Post-convergence work on the host thread: resort, prune, notify.
    fn flush(&self, round: Round) {
        let removed = {
            let mut registry = self.registry.lock();
            registry.resort();
            registry.prune_missing_sources()
        };
        if self.config.prune_orphans && !removed.is_empty() {
            self.remove_orphan_targets(&removed);
        }

        for (path, error) in &round.failures {
            log::error!("import failed for {:?}: {}", path, error);
            self.notifier.notify_failure(path, error);
        }
        self.notifier.flush(&round.events);
    }

    /// Opt-in orphan pass: delete targets of pruned assets, but only when
    /// the full target-path derivation matches no live asset. Anything else
    /// in the output tree is left alone.
    fn remove_orphan_targets(&self, removed: &[AssetRecord]) {
        let live: HashSet<PathBuf> = {
            let registry = self.registry.lock();
            registry
                .assets_in_order()
                .map(|r| target_path(&self.config.output_dir, r.kind, &r.relative_path))
                .collect()
        };

        let mut any = false;
        for record in removed {
            let target = target_path(&self.config.output_dir, record.kind, &record.relative_path);
            if live.contains(&target) || !target.exists() {
                continue;
            }
            match std::fs::remove_file(&target) {
                Ok(()) => {
                    log::info!("removed orphan target {:?}", target);
                    any = true;
                }
                Err(e) => log::warn!("could not remove orphan target {:?}: {}", target, e),
            }
        }
        if any {
            // The manifest was generated before the orphans went away.
            self.state.lock().dirty = true;
        }
    }

    /// True while a post-import round (manifest job) is pending.
    pub fn is_converging(&self) -> bool {
        self.state.lock().barrier.is_some()
    }

    /// True when the queue, job set and barrier are all drained.
    pub fn is_idle(&self) -> bool {
        let state = self.state.lock();
        self.queue.is_empty() && state.active.is_empty() && state.barrier.is_none() && !state.dirty
    }

    /// Drive the pipeline until idle. Blocks on job completion signals
    /// between ticks rather than spinning; only for synchronous callers
    /// (one-shot builds, "create asset and use it now" editor flows).
    pub fn wait_for_idle(&self) {
        loop {
            self.update();
            let pending = {
                let state = self.state.lock();
                state
                    .barrier
                    .as_ref()
                    .map(|r| r.handle.clone())
                    .or_else(|| state.active.values().next().map(|j| j.handle.clone()))
            };
            match pending {
                Some(handle) => handle.wait(),
                None => {
                    if self.is_idle() {
                        return;
                    }
                    std::thread::yield_now();
                }
            }
        }
    }

    /// One-shot build: request an import for every recognized file under the
    /// roots and block until converged (a manifest round always runs, even
    /// when everything was already fresh). Returns the number of imports
    /// that failed during the build.
    ///
    /// The roots are enumerated directly rather than through the bounded
    /// event queue; the queue's drop-oldest policy must never skip a file
    /// in a one-shot build.
    pub fn build_all(&self) -> u64 {
        let failures_before = self.failed_import_count();

        for root in &self.config.roots {
            self.request_all_under(root);
        }
        self.state.lock().dirty = true;
        self.wait_for_idle();

        self.failed_import_count() - failures_before
    }

    fn request_all_under(&self, dir: &Path) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("cannot enumerate {:?}: {}", dir, e);
                return;
            }
        };
        for entry in entries {
            let Ok(entry) = entry else { continue };
            let path = entry.path();
            if path.is_dir() {
                self.request_all_under(&path);
            } else if let Err(e) = self.request_import(&path) {
                log::debug!("skipping {:?}: {}", path, e);
            }
        }
    }

    /// Stop the watcher and join all workers. In-flight imports finish.
    pub fn shutdown(&mut self) {
        self.stop_watcher();
        self.jobs.shutdown();
    }
}

impl Drop for ImportPipeline {
    fn drop(&mut self) {
        self.stop_watcher();
    }
}

type ImportFnPtr = kiln_asset::ImportFn;

/// Build the closure body of one import job. Runs on a worker: loads the
/// sidecar fresh, writes the target through a temp file so a failed import
/// never leaves a partial artifact, and reports through the shared lists.
fn import_job(
    record: AssetRecord,
    target: PathBuf,
    import: ImportFnPtr,
    props: Properties,
    completed: Arc<Mutex<Vec<ImportEvent>>>,
    failures: Arc<Mutex<Vec<(PathBuf, String)>>>,
    failed_imports: Arc<AtomicU64>,
) -> impl FnOnce() -> Result<(), JobError> + Send + 'static {
    move || {
        let meta = SidecarMeta::load_for(&record.source_path);
        match write_target(&record, &target, import, &props, &meta) {
            Ok(()) => {
                log::info!("imported '{}' -> {:?}", record.canonical_name, target);
                completed.lock().push(ImportEvent {
                    name: record.canonical_name.clone(),
                    kind: record.kind,
                });
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                failures
                    .lock()
                    .push((record.source_path.clone(), message.clone()));
                failed_imports.fetch_add(1, Ordering::Relaxed);
                Err(JobError::Failed(message))
            }
        }
    }
}

fn write_target(
    record: &AssetRecord,
    target: &Path,
    import: ImportFnPtr,
    props: &Properties,
    meta: &SidecarMeta,
) -> Result<(), ImportError> {
    let parent = target.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(parent)?;

    let file_name = target
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("target");
    let tmp = parent.join(format!(".{}.tmp", file_name));

    let result = (|| {
        let file = std::fs::File::create(&tmp)?;
        let mut out = std::io::BufWriter::new(file);
        import(record, &mut out, props, meta)?;
        out.flush()?;
        Ok(())
    })();

    match result {
        Ok(()) => {
            std::fs::rename(&tmp, target)?;
            Ok(())
        }
        Err(e) => {
            let _ = std::fs::remove_file(&tmp);
            Err(e)
        }
    }
}

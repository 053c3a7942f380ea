//! End-to-end pipeline tests: source tree in, compiled targets + manifest +
//! listener notifications out.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use kiln_asset::AssetKind;
use kiln_pipeline::{ImportEvent, ImportListener, ImportPipeline, PipelineConfig};
use kiln_watch::{FileChangeEvent, FileChangeKind};
use parking_lot::Mutex;

/// Listener that records every convergence batch and failure it receives.
#[derive(Default)]
struct Recorder {
    batches: Mutex<Vec<Vec<ImportEvent>>>,
    failures: Mutex<Vec<(PathBuf, String)>>,
}

struct RecorderHandle(Arc<Recorder>);

impl ImportListener for RecorderHandle {
    fn assets_changed(&self, events: &[ImportEvent]) {
        self.0.batches.lock().push(events.to_vec());
    }

    fn import_failed(&self, path: &Path, error: &str) {
        self.0
            .failures
            .lock()
            .push((path.to_path_buf(), error.to_string()));
    }
}

fn setup(dir: &Path, extra_config: &str) -> (ImportPipeline, Arc<Recorder>) {
    let config_path = dir.join("kiln.properties");
    fs::write(
        &config_path,
        format!(
            "source.assets = assets\n\
             output.dir = build\n\
             jobs.workers = 2\n\
             {}",
            extra_config
        ),
    )
    .unwrap();
    fs::create_dir_all(dir.join("assets")).unwrap();

    let pipeline = ImportPipeline::new(PipelineConfig::load(&config_path));
    let recorder = Arc::new(Recorder::default());
    pipeline.add_listener(Box::new(RecorderHandle(recorder.clone())));
    (pipeline, recorder)
}

fn write_png(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    image::RgbaImage::from_pixel(2, 2, image::Rgba([200, 40, 40, 255]))
        .save(path)
        .unwrap();
}

#[test]
fn test_build_all_imports_and_notifies_once() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, recorder) = setup(dir.path(), "");

    write_png(&dir.path().join("assets/textures/icon.png"));
    fs::write(dir.path().join("assets/hero.mesh"), b"mesh bytes").unwrap();
    fs::write(dir.path().join("assets/hero.skel"), b"skel bytes").unwrap();
    fs::write(dir.path().join("assets/run.anim"), b"anim bytes").unwrap();

    assert_eq!(pipeline.build_all(), 0);

    // One converged batch with all four assets.
    let batches = recorder.batches.lock();
    assert_eq!(batches.len(), 1);
    let names: Vec<&str> = batches[0].iter().map(|e| e.name.as_str()).collect();
    assert_eq!(batches[0].len(), 4);
    assert!(names.contains(&"textures_icon"));
    assert!(names.contains(&"hero"));
    assert!(names.contains(&"run"));

    // Targets land under output/<kind>/ with flattened names.
    let texture = dir.path().join("build/texture/textures_icon.png");
    assert!(texture.exists());
    let header = fs::read(&texture).unwrap();
    assert_eq!(&header[0..4], b"KTEX");
    assert_eq!(
        fs::read(dir.path().join("build/mesh/hero.mesh")).unwrap()[0..4],
        *b"KMSH"
    );

    // Manifest pair written next to the output tree.
    let manifest = fs::read_to_string(dir.path().join("build/asset_manifest.rs")).unwrap();
    assert!(manifest.contains("TEXTURES_ICON"));
    assert!(dir.path().join("build/asset_manifest.json").exists());
}

#[test]
fn test_second_build_is_incremental_and_silent() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, recorder) = setup(dir.path(), "");

    write_png(&dir.path().join("assets/textures/icon.png"));
    pipeline.build_all();
    assert_eq!(recorder.batches.lock().len(), 1);

    let manifest_path = dir.path().join("build/asset_manifest.rs");
    let first = fs::read(&manifest_path).unwrap();

    // Everything is fresh: the forced manifest round runs but no imports
    // happen, so listeners stay quiet and the manifest is byte-identical.
    assert_eq!(pipeline.build_all(), 0);
    assert_eq!(recorder.batches.lock().len(), 1);
    assert_eq!(fs::read(&manifest_path).unwrap(), first);
}

#[test]
fn test_change_event_triggers_reimport() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, recorder) = setup(dir.path(), "");

    let source = dir.path().join("assets/hero.mesh");
    fs::write(&source, b"v1").unwrap();
    pipeline.build_all();

    // Rewrite the source with a bumped mtime, then feed the event the
    // watcher would have produced.
    fs::write(&source, b"v2 payload").unwrap();
    let future = std::time::SystemTime::now() + std::time::Duration::from_secs(5);
    fs::File::options()
        .write(true)
        .open(&source)
        .unwrap()
        .set_modified(future)
        .unwrap();

    pipeline.event_queue().push(FileChangeEvent {
        path: source.clone(),
        kind: FileChangeKind::Modified,
        timestamp: std::time::SystemTime::now(),
    });
    pipeline.wait_for_idle();

    assert_eq!(recorder.batches.lock().len(), 2);
    let target = fs::read(dir.path().join("build/mesh/hero.mesh")).unwrap();
    assert_eq!(&target[8..], b"v2 payload");
}

#[test]
fn test_meta_change_reimports_companion_asset() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, recorder) = setup(dir.path(), "");

    let source = dir.path().join("assets/run.anim");
    fs::write(&source, b"frames").unwrap();
    pipeline.build_all();

    // A new sidecar is newer than the target, so the asset is stale.
    let meta = dir.path().join("assets/run.anim.meta");
    fs::write(&meta, "compress = true\n").unwrap();
    let future = std::time::SystemTime::now() + std::time::Duration::from_secs(5);
    fs::File::options()
        .write(true)
        .open(&meta)
        .unwrap()
        .set_modified(future)
        .unwrap();

    pipeline.event_queue().push(FileChangeEvent {
        path: meta,
        kind: FileChangeKind::Added,
        timestamp: std::time::SystemTime::now(),
    });
    pipeline.wait_for_idle();

    let batches = recorder.batches.lock();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[1][0].name, "run");
    assert_eq!(batches[1][0].kind, AssetKind::Animation);
}

#[test]
fn test_deleted_source_is_pruned_from_registry_and_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, _recorder) = setup(dir.path(), "output.prune_orphans = true\n");

    let keep = dir.path().join("assets/keep.mesh");
    let gone = dir.path().join("assets/gone.mesh");
    fs::write(&keep, b"keep").unwrap();
    fs::write(&gone, b"gone").unwrap();
    pipeline.build_all();

    let gone_target = dir.path().join("build/mesh/gone.mesh");
    assert!(gone_target.exists());

    fs::remove_file(&gone).unwrap();
    pipeline.event_queue().push(FileChangeEvent {
        path: gone.clone(),
        kind: FileChangeKind::Deleted,
        timestamp: std::time::SystemTime::now(),
    });
    pipeline.wait_for_idle();

    assert_eq!(pipeline.registry().len(), 1);
    assert!(!gone_target.exists());
    let manifest = fs::read_to_string(dir.path().join("build/asset_manifest.rs")).unwrap();
    assert!(manifest.contains("KEEP"));
    assert!(!manifest.contains("GONE"));
}

#[test]
fn test_failure_is_reported_and_does_not_block_other_imports() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, recorder) = setup(dir.path(), "");

    fs::write(dir.path().join("assets/broken.png"), b"not an image").unwrap();
    fs::write(dir.path().join("assets/fine.mesh"), b"payload").unwrap();

    assert_eq!(pipeline.build_all(), 1);

    let failures = recorder.failures.lock();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].0.ends_with("broken.png"));

    // The good asset still converged and shipped in a batch.
    let batches = recorder.batches.lock();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0][0].name, "fine");
    assert!(dir.path().join("build/mesh/fine.mesh").exists());
    // No partial target for the failed one.
    assert!(!dir.path().join("build/texture/broken.png").exists());
}

#[test]
fn test_coalesced_request_reimports_after_inflight_job() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, _recorder) = setup(dir.path(), "");

    let source = dir.path().join("assets/big.mesh");
    fs::write(&source, b"v1").unwrap();
    pipeline.build_all();

    // Two change events for the same asset in one drain: the first
    // schedules, the second coalesces into a requeue. After convergence the
    // target reflects the final contents.
    fs::write(&source, b"final contents").unwrap();
    let future = std::time::SystemTime::now() + std::time::Duration::from_secs(5);
    fs::File::options()
        .write(true)
        .open(&source)
        .unwrap()
        .set_modified(future)
        .unwrap();

    for _ in 0..2 {
        pipeline.event_queue().push(FileChangeEvent {
            path: source.clone(),
            kind: FileChangeKind::Modified,
            timestamp: std::time::SystemTime::now(),
        });
    }
    pipeline.wait_for_idle();

    let target = fs::read(dir.path().join("build/mesh/big.mesh")).unwrap();
    assert_eq!(&target[8..], b"final contents");
    assert!(pipeline.is_idle());
}

/// Passthrough importer that declares a dependency on `palette.txt` next to
/// its source.
fn import_swatch(
    record: &kiln_asset::AssetRecord,
    out: &mut dyn std::io::Write,
    _config: &kiln_asset::Properties,
    _meta: &kiln_asset::SidecarMeta,
) -> Result<(), kiln_asset::ImportError> {
    out.write_all(b"KSWT")?;
    out.write_all(&fs::read(&record.source_path)?)?;
    Ok(())
}

fn swatch_depends(record: &kiln_asset::AssetRecord, changed: &Path) -> bool {
    changed.file_name().is_some_and(|n| n == "palette.txt")
        && changed.parent() == record.source_path.parent()
}

#[test]
fn test_dependency_change_reimports_dependents() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("kiln.properties");
    fs::write(&config_path, "source.assets = assets\noutput.dir = build\n").unwrap();
    fs::create_dir_all(dir.path().join("assets")).unwrap();

    let mut registry = kiln_asset::AssetRegistry::with_default_importers();
    registry.register_importer(kiln_asset::Importer {
        kind: AssetKind::Texture,
        extensions: &["swatch"],
        signature: *b"KSWT",
        version: 1,
        import: import_swatch,
        depends_on: Some(swatch_depends),
    });
    let pipeline = ImportPipeline::with_registry(PipelineConfig::load(&config_path), registry);
    let recorder = Arc::new(Recorder::default());
    pipeline.add_listener(Box::new(RecorderHandle(recorder.clone())));

    let source = dir.path().join("assets/sky.swatch");
    fs::write(&source, b"blue").unwrap();
    let palette = dir.path().join("assets/palette.txt");
    fs::write(&palette, b"colors").unwrap();
    pipeline.build_all();
    assert_eq!(recorder.batches.lock().len(), 1);

    // The palette has no importer, but the swatch declares it as an input,
    // so the swatch is re-imported even though its own mtimes look fresh.
    fs::write(&palette, b"new colors").unwrap();
    pipeline.event_queue().push(FileChangeEvent {
        path: palette,
        kind: FileChangeKind::Modified,
        timestamp: std::time::SystemTime::now(),
    });
    pipeline.wait_for_idle();

    let batches = recorder.batches.lock();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[1][0].name, "sky");
}

#[test]
fn test_build_all_is_not_limited_by_queue_capacity() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, recorder) = setup(dir.path(), "watch.queue_capacity = 4\n");

    let count = 10;
    for n in 0..count {
        fs::write(
            dir.path().join(format!("assets/part_{:02}.mesh", n)),
            b"payload",
        )
        .unwrap();
    }

    // The one-shot build enumerates the roots directly; the bounded event
    // queue's drop-oldest policy must not cap how many files it imports.
    assert_eq!(pipeline.build_all(), 0);

    assert_eq!(pipeline.registry().len(), count);
    for n in 0..count {
        let target = dir.path().join(format!("build/mesh/part_{:02}.mesh", n));
        assert!(target.exists(), "missing target {:?}", target);
    }
    let batches = recorder.batches.lock();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), count);
}

/// Importer that blocks until a `.go` file appears next to its source.
fn import_gated(
    record: &kiln_asset::AssetRecord,
    out: &mut dyn std::io::Write,
    _config: &kiln_asset::Properties,
    _meta: &kiln_asset::SidecarMeta,
) -> Result<(), kiln_asset::ImportError> {
    let gate = record.source_path.with_extension("go");
    let deadline = Instant::now() + Duration::from_secs(5);
    while !gate.exists() {
        if Instant::now() > deadline {
            return Err(kiln_asset::ImportError::Malformed {
                kind: "gated",
                path: record.source_path.clone(),
                message: "gate never opened".to_string(),
            });
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    out.write_all(b"KGTE")?;
    Ok(())
}

#[test]
fn test_batch_excludes_jobs_finishing_in_the_next_round() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("kiln.properties");
    fs::write(&config_path, "source.assets = assets\noutput.dir = build\n").unwrap();
    fs::create_dir_all(dir.path().join("assets")).unwrap();

    let mut registry = kiln_asset::AssetRegistry::with_default_importers();
    registry.register_importer(kiln_asset::Importer {
        kind: AssetKind::Mesh,
        extensions: &["gate"],
        signature: *b"KGTE",
        version: 1,
        import: import_gated,
        depends_on: None,
    });
    let pipeline = ImportPipeline::with_registry(PipelineConfig::load(&config_path), registry);
    let recorder = Arc::new(Recorder::default());
    pipeline.add_listener(Box::new(RecorderHandle(recorder.clone())));

    // Round one: a fast asset, ticked until its round's manifest job is
    // scheduled.
    let first = dir.path().join("assets/first.mesh");
    fs::write(&first, b"payload").unwrap();
    assert!(pipeline.request_import(&first).unwrap());
    let deadline = Instant::now() + Duration::from_secs(10);
    while !pipeline.is_converging() {
        assert!(Instant::now() < deadline, "round never reached its barrier");
        pipeline.update();
        std::thread::sleep(Duration::from_millis(2));
    }

    // A second import spawned while that round is still pending; it
    // finishes (gate released) before the host observes the round closing.
    let second = dir.path().join("assets/late.gate");
    fs::write(&second, b"payload").unwrap();
    assert!(pipeline.request_import(&second).unwrap());
    fs::write(dir.path().join("assets/late.go"), b"").unwrap();
    std::thread::sleep(Duration::from_millis(100));

    pipeline.wait_for_idle();

    // The first batch is exactly the converged round; the late job reports
    // in its own round.
    let batches = recorder.batches.lock();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].len(), 1);
    assert_eq!(batches[0][0].name, "first");
    assert_eq!(batches[1][0].name, "late");
}

#[test]
fn test_watcher_feeds_pipeline_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, recorder) = setup(dir.path(), "watch.interval_ms = 20\n");

    pipeline.start_watcher().unwrap();
    write_png(&dir.path().join("assets/live.png"));

    // Poll the host tick until the watcher has picked the file up and the
    // round converged.
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
    loop {
        pipeline.update();
        if !recorder.batches.lock().is_empty() {
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "watcher never delivered the new asset"
        );
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    pipeline.stop_watcher();

    assert_eq!(recorder.batches.lock()[0][0].name, "live");
    assert!(dir.path().join("build/texture/live.png").exists());
}

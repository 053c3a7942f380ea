//! Staleness oracle: should an asset be re-imported?

use std::path::Path;
use std::time::SystemTime;

/// Decide whether `source` must be re-imported into `target`.
///
/// True if any of:
/// 1. no target artifact exists yet,
/// 2. the sidecar `meta` exists and is newer than the target,
/// 3. the source is newer than the target,
/// 4. the global `config` file is newer than the target.
///
/// Pure decision over current filesystem timestamps; callers re-evaluate
/// per request, never cache the answer.
pub fn needs_import(source: &Path, meta: &Path, target: &Path, config: &Path) -> bool {
    let target_time = match mtime(target) {
        Some(t) => t,
        None => return true,
    };

    if let Some(meta_time) = mtime(meta) {
        if meta_time > target_time {
            return true;
        }
    }
    if let Some(source_time) = mtime(source) {
        if source_time > target_time {
            return true;
        }
    }
    if let Some(config_time) = mtime(config) {
        if config_time > target_time {
            return true;
        }
    }
    false
}

fn mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;

    fn touch(path: &Path, offset: Duration) {
        fs::write(path, b"x").unwrap();
        let f = fs::File::options().write(true).open(path).unwrap();
        f.set_modified(SystemTime::now() + offset).unwrap();
    }

    #[test]
    fn test_missing_target_is_always_stale() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("icon.png");
        let meta = dir.path().join("icon.png.meta");
        let config = dir.path().join("kiln.properties");
        let target = dir.path().join("missing-target");
        touch(&source, Duration::ZERO);

        // True regardless of which other inputs exist.
        assert!(needs_import(&source, &meta, &target, &config));
        touch(&meta, Duration::ZERO);
        touch(&config, Duration::ZERO);
        assert!(needs_import(&source, &meta, &target, &config));
    }

    #[test]
    fn test_fresh_target_is_not_stale() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("icon.png");
        let target = dir.path().join("target.bin");
        let config = dir.path().join("kiln.properties");
        touch(&source, Duration::ZERO);
        touch(&config, Duration::ZERO);
        touch(&target, Duration::from_secs(60));

        let meta = dir.path().join("icon.png.meta");
        assert!(!needs_import(&source, &meta, &target, &config));
    }

    #[test]
    fn test_newer_source_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("icon.png");
        let target = dir.path().join("target.bin");
        touch(&target, Duration::ZERO);
        touch(&source, Duration::from_secs(60));

        assert!(needs_import(
            &source,
            &dir.path().join("icon.png.meta"),
            &target,
            &dir.path().join("kiln.properties"),
        ));
    }

    #[test]
    fn test_newer_meta_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("icon.png");
        let meta = dir.path().join("icon.png.meta");
        let target = dir.path().join("target.bin");
        touch(&source, Duration::ZERO);
        touch(&target, Duration::from_secs(60));
        touch(&meta, Duration::from_secs(120));

        assert!(needs_import(
            &source,
            &meta,
            &target,
            &dir.path().join("kiln.properties"),
        ));
    }

    #[test]
    fn test_touched_config_marks_stale() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("icon.png");
        let meta = dir.path().join("icon.png.meta");
        let target = dir.path().join("target.bin");
        let config = dir.path().join("kiln.properties");
        touch(&source, Duration::ZERO);
        touch(&meta, Duration::ZERO);
        touch(&target, Duration::from_secs(60));
        touch(&config, Duration::from_secs(120));

        assert!(needs_import(&source, &meta, &target, &config));
    }
}

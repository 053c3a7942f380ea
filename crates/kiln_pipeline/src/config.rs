//! Pipeline configuration, loaded from a properties file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use kiln_asset::Properties;

/// Pipeline configuration.
///
/// The config file's own modification time participates in the staleness
/// oracle: touching it marks every asset stale.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Path of the config file itself (staleness input).
    pub config_path: PathBuf,
    /// Raw properties, passed through to importer functions.
    pub props: Properties,
    /// Watch roots (`source.*` keys, sorted by key).
    pub roots: Vec<PathBuf>,
    /// Compiled targets root (`output.dir`).
    pub output_dir: PathBuf,
    /// Generated manifest source path (`output.manifest`).
    pub manifest_path: PathBuf,
    /// Opt-in orphan artifact removal (`output.prune_orphans`).
    pub prune_orphans: bool,
    /// Watcher poll interval (`watch.interval_ms`).
    pub watch_interval: Duration,
    /// Modification-time tolerance (`watch.tolerance_ms`).
    pub tolerance: Duration,
    /// Event queue capacity (`watch.queue_capacity`).
    pub queue_capacity: usize,
    /// Worker thread count (`jobs.workers`).
    pub workers: usize,
}

impl PipelineConfig {
    /// Load from a properties file. A missing or unreadable file logs an
    /// error and falls back to defaults; the pipeline still starts.
    pub fn load(path: &Path) -> Self {
        match Properties::load(path) {
            Ok(props) => Self::from_props(path, props),
            Err(e) => {
                log::error!(
                    "cannot read pipeline config {:?}: {} (using defaults)",
                    path,
                    e
                );
                Self::from_props(path, Properties::new())
            }
        }
    }

    /// Build from already-parsed properties. Relative paths resolve against
    /// the config file's directory.
    pub fn from_props(path: &Path, props: Properties) -> Self {
        let base = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        let resolve = |p: PathBuf| if p.is_absolute() { p } else { base.join(p) };

        let roots: Vec<PathBuf> = props
            .keys_with_prefix("source.")
            .map(|(_, v)| resolve(PathBuf::from(v)))
            .collect();

        let output_dir = resolve(props.get_path("output.dir").unwrap_or_else(|| "build".into()));
        let manifest_path = props
            .get_path("output.manifest")
            .map(&resolve)
            .unwrap_or_else(|| output_dir.join("asset_manifest.rs"));

        Self {
            config_path: path.to_path_buf(),
            roots,
            output_dir,
            manifest_path,
            prune_orphans: props.get_bool("output.prune_orphans").unwrap_or(false),
            watch_interval: Duration::from_millis(props.get_u64("watch.interval_ms").unwrap_or(500)),
            tolerance: Duration::from_millis(props.get_u64("watch.tolerance_ms").unwrap_or(4)),
            queue_capacity: props.get_u64("watch.queue_capacity").unwrap_or(256) as usize,
            workers: props.get_u64("jobs.workers").unwrap_or(4) as usize,
            props,
        }
    }

    /// The watch root containing `path`, if any.
    pub fn root_of(&self, path: &Path) -> Option<&Path> {
        self.roots
            .iter()
            .find(|root| path.starts_with(root))
            .map(|p| p.as_path())
    }
}

//! # Kiln Asset
//!
//! Asset registry for the import pipeline.
//!
//! This crate answers the questions the scheduler asks about an asset:
//! which importer handles it, what its canonical name is, and where its
//! compiled target lives. It also carries the key/value properties format
//! used by both the pipeline configuration and `.meta` sidecar files, and
//! the built-in importer functions.
//!
//! The registry does not own asset lifecycle beyond bookkeeping: the actual
//! import work runs on background jobs driven by the scheduler.

pub mod error;
pub mod importers;
pub mod kind;
pub mod meta;
pub mod name;
pub mod props;
pub mod registry;

pub use error::{AssetError, ImportError};
pub use kind::AssetKind;
pub use meta::SidecarMeta;
pub use name::{canonical_asset_name, safe_filename, target_path};
pub use props::Properties;
pub use registry::{AssetId, AssetRecord, AssetRegistry, DependsFn, ImportFn, Importer};

/// Sidecar metadata extension.
pub const META_EXTENSION: &str = "meta";

/// Path to the `.meta` sidecar for a source file.
pub fn meta_path(source: &std::path::Path) -> std::path::PathBuf {
    let mut s = source.as_os_str().to_os_string();
    s.push(".meta");
    std::path::PathBuf::from(s)
}

/// If `path` is a `.meta` sidecar, the companion source path it describes.
pub fn meta_companion(path: &std::path::Path) -> Option<std::path::PathBuf> {
    if path.extension().and_then(|e| e.to_str()) == Some(META_EXTENSION) {
        Some(std::path::PathBuf::from(
            path.as_os_str()
                .to_str()?
                .strip_suffix(".meta")?
                .to_string(),
        ))
    } else {
        None
    }
}

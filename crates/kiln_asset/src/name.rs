//! Canonical asset names, safe target filenames, and target paths.

use std::path::{Path, PathBuf};

use crate::kind::AssetKind;

/// Canonical name for an asset, derived from its root-relative path.
///
/// Lowercase; the extension is dropped; path separators and every other
/// non-alphanumeric character become `_`. `textures/icon.png` becomes
/// `textures_icon`.
pub fn canonical_asset_name(relative: &Path) -> String {
    let without_ext = relative.with_extension("");
    sanitize(&without_ext.to_string_lossy())
}

/// Filename of the compiled target for a root-relative source path.
///
/// Like the canonical name but keeps the (lowercased) extension, so
/// `textures/icon.png` becomes `textures_icon.png`.
pub fn safe_filename(relative: &Path) -> String {
    let ext = relative.extension().and_then(|e| e.to_str());
    let stem = relative.with_extension("");
    let base = sanitize(&stem.to_string_lossy());
    match ext {
        Some(ext) => format!("{}.{}", base, ext.to_lowercase()),
        None => base,
    }
}

/// Full path of the compiled target:
/// `output_dir / kind / safe_filename(relative)`.
pub fn target_path(output_dir: &Path, kind: AssetKind, relative: &Path) -> PathBuf {
    output_dir.join(kind.dir_name()).join(safe_filename(relative))
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() { c } else { '_' }
        })
        .collect()
}

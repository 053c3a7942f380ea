//! Sidecar metadata (`<source>.meta`) handling.

use std::path::Path;

use crate::props::Properties;

/// Editor- and importer-specific settings for one source asset.
///
/// Absence of the sidecar file is not an error; it reads as all-defaults.
#[derive(Debug, Clone, Default)]
pub struct SidecarMeta {
    props: Properties,
}

impl SidecarMeta {
    /// All-defaults metadata.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the sidecar for `source`, or defaults if it does not exist.
    /// Unreadable-but-present sidecars log a warning and read as defaults.
    pub fn load_for(source: &Path) -> Self {
        let path = crate::meta_path(source);
        if !path.exists() {
            return Self::empty();
        }
        match Properties::load(&path) {
            Ok(props) => Self { props },
            Err(e) => {
                log::warn!("unreadable sidecar {:?}: {}", path, e);
                Self::empty()
            }
        }
    }

    /// Explicit import priority. Lower sorts first; default 0.
    pub fn priority(&self) -> i32 {
        self.props.get_i32("priority").unwrap_or(0)
    }

    /// Importer-specific value; the core passes these through untouched.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.props.get(key)
    }

    /// Importer-specific boolean.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.props.get_bool(key)
    }
}

impl From<Properties> for SidecarMeta {
    fn from(props: Properties) -> Self {
        Self { props }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_missing_sidecar_is_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("icon.png");
        fs::write(&source, b"png").unwrap();

        let meta = SidecarMeta::load_for(&source);
        assert_eq!(meta.priority(), 0);
        assert_eq!(meta.get("srgb"), None);
    }

    #[test]
    fn test_sidecar_values() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("icon.png");
        fs::write(&source, b"png").unwrap();
        fs::write(dir.path().join("icon.png.meta"), "priority = -2\nsrgb = true\n").unwrap();

        let meta = SidecarMeta::load_for(&source);
        assert_eq!(meta.priority(), -2);
        assert_eq!(meta.get_bool("srgb"), Some(true));
    }
}

//! Asset kinds and their extension mapping.

use std::path::Path;

/// Asset kind/type.
///
/// The discriminant order is the sort order used when the in-memory asset
/// list is re-sorted after a convergence round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetKind {
    Texture,
    Mesh,
    Skeleton,
    Animation,
}

impl AssetKind {
    /// All kinds, in sort order.
    pub const ALL: [AssetKind; 4] = [
        AssetKind::Texture,
        AssetKind::Mesh,
        AssetKind::Skeleton,
        AssetKind::Animation,
    ];

    /// Determine asset kind from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" | "jpg" | "jpeg" | "bmp" | "tga" => Some(AssetKind::Texture),
            "mesh" => Some(AssetKind::Mesh),
            "skel" => Some(AssetKind::Skeleton),
            "anim" => Some(AssetKind::Animation),
            _ => None,
        }
    }

    /// Determine asset kind from a path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension().and_then(|e| e.to_str())?;
        Self::from_extension(ext)
    }

    /// Lowercase name used as the target subdirectory and manifest group.
    pub fn dir_name(&self) -> &'static str {
        match self {
            AssetKind::Texture => "texture",
            AssetKind::Mesh => "mesh",
            AssetKind::Skeleton => "skeleton",
            AssetKind::Animation => "animation",
        }
    }

    /// Inverse of [`AssetKind::dir_name`], used when re-deriving the
    /// manifest from the built target tree.
    pub fn from_dir_name(name: &str) -> Option<Self> {
        match name {
            "texture" => Some(AssetKind::Texture),
            "mesh" => Some(AssetKind::Mesh),
            "skeleton" => Some(AssetKind::Skeleton),
            "animation" => Some(AssetKind::Animation),
            _ => None,
        }
    }
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

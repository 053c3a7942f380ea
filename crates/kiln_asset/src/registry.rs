//! Registry of known assets and their importers.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{AssetError, ImportError};
use crate::kind::AssetKind;
use crate::meta::SidecarMeta;
use crate::name::canonical_asset_name;
use crate::props::Properties;

/// Unique identifier for a registered asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId(pub u64);

/// Per-type import function.
///
/// Writes a self-describing header (signature, version) followed by the
/// type payload to the output stream. Errors on malformed input.
pub type ImportFn =
    fn(&AssetRecord, &mut dyn Write, &Properties, &SidecarMeta) -> Result<(), ImportError>;

/// Optional dependency predicate: does this asset need re-importing when
/// `changed` (a non-asset file) changes?
pub type DependsFn = fn(&AssetRecord, &Path) -> bool;

/// An importer for one asset type.
pub struct Importer {
    /// Asset kind this importer produces.
    pub kind: AssetKind,
    /// Source extensions (lowercase) this importer claims.
    pub extensions: &'static [&'static str],
    /// Four-byte signature written at the start of every target.
    pub signature: [u8; 4],
    /// Format version written after the signature.
    pub version: u32,
    /// The import function.
    pub import: ImportFn,
    /// Optional dependency predicate.
    pub depends_on: Option<DependsFn>,
}

/// One known asset.
///
/// The core reads these fields and invokes the importer; asset lifecycle
/// beyond registry bookkeeping belongs to the embedding editor.
#[derive(Debug, Clone)]
pub struct AssetRecord {
    pub id: AssetId,
    /// Absolute source path.
    pub source_path: PathBuf,
    /// Path relative to its watch root; names and targets derive from this.
    pub relative_path: PathBuf,
    /// Lowercase underscore name, e.g. `textures_icon`.
    pub canonical_name: String,
    pub kind: AssetKind,
    /// Explicit sort priority from the sidecar; lower sorts first.
    pub priority: i32,
    /// Original insertion order, the final sort tiebreaker.
    pub insertion: u64,
}

/// Registry of assets and importers.
pub struct AssetRegistry {
    importers: Vec<Importer>,
    by_extension: HashMap<String, usize>,
    assets: HashMap<AssetId, AssetRecord>,
    by_path: HashMap<PathBuf, AssetId>,
    by_name: HashMap<String, AssetId>,
    /// Current presentation order; rebuilt by [`AssetRegistry::resort`].
    order: Vec<AssetId>,
    next_id: u64,
    next_insertion: u64,
}

impl AssetRegistry {
    /// Empty registry with no importers.
    pub fn new() -> Self {
        Self {
            importers: Vec::new(),
            by_extension: HashMap::new(),
            assets: HashMap::new(),
            by_path: HashMap::new(),
            by_name: HashMap::new(),
            order: Vec::new(),
            next_id: 1,
            next_insertion: 0,
        }
    }

    /// Registry with the built-in texture/mesh/skeleton/animation importers.
    pub fn with_default_importers() -> Self {
        let mut registry = Self::new();
        for importer in crate::importers::defaults() {
            registry.register_importer(importer);
        }
        registry
    }

    /// Register an importer. Later registrations win extension conflicts.
    pub fn register_importer(&mut self, importer: Importer) {
        let index = self.importers.len();
        for ext in importer.extensions {
            if self.by_extension.insert(ext.to_string(), index).is_some() {
                log::warn!("extension '{}' re-registered; later importer wins", ext);
            }
        }
        self.importers.push(importer);
    }

    /// Resolve the importer for a file extension.
    pub fn resolve_importer(&self, extension: &str) -> Option<&Importer> {
        let index = *self.by_extension.get(&extension.to_lowercase())?;
        self.importers.get(index)
    }

    /// Resolve the importer for an asset record (by its source extension).
    pub fn importer_for(&self, record: &AssetRecord) -> Option<&Importer> {
        let ext = record.source_path.extension().and_then(|e| e.to_str())?;
        self.resolve_importer(ext)
    }

    /// Look up or create the record for a source path under `root`.
    ///
    /// Placeholder creation requires a recognized extension; the record's
    /// priority is read from the sidecar at insertion time.
    pub fn resolve_or_insert(&mut self, source: &Path, root: &Path) -> Result<AssetId, AssetError> {
        if let Some(&id) = self.by_path.get(source) {
            return Ok(id);
        }

        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let importer = self
            .resolve_importer(ext)
            .ok_or_else(|| AssetError::UnknownExtension(ext.to_string()))?;
        let kind = importer.kind;

        let relative = source
            .strip_prefix(root)
            .map_err(|_| AssetError::OutsideRoots(source.to_path_buf()))?
            .to_path_buf();

        let id = AssetId(self.next_id);
        self.next_id += 1;

        let record = AssetRecord {
            id,
            source_path: source.to_path_buf(),
            relative_path: relative.clone(),
            canonical_name: canonical_asset_name(&relative),
            kind,
            priority: SidecarMeta::load_for(source).priority(),
            insertion: self.next_insertion,
        };
        self.next_insertion += 1;

        log::debug!("registered asset '{}' ({})", record.canonical_name, kind);
        self.by_path.insert(record.source_path.clone(), id);
        self.by_name.insert(record.canonical_name.clone(), id);
        self.assets.insert(id, record);
        self.order.push(id);
        Ok(id)
    }

    /// Record lookup by id.
    pub fn get(&self, id: AssetId) -> Option<&AssetRecord> {
        self.assets.get(&id)
    }

    /// Record lookup by absolute source path.
    pub fn get_by_path(&self, path: &Path) -> Option<&AssetRecord> {
        self.by_path.get(path).and_then(|id| self.assets.get(id))
    }

    /// Record lookup by canonical name.
    pub fn get_by_name(&self, name: &str) -> Option<&AssetRecord> {
        self.by_name.get(name).and_then(|id| self.assets.get(id))
    }

    /// Refresh a record's priority from its sidecar.
    pub fn refresh_priority(&mut self, id: AssetId) {
        if let Some(record) = self.assets.get_mut(&id) {
            record.priority = SidecarMeta::load_for(&record.source_path).priority();
        }
    }

    /// Records in current presentation order.
    pub fn assets_in_order(&self) -> impl Iterator<Item = &AssetRecord> {
        self.order.iter().filter_map(|id| self.assets.get(id))
    }

    /// Re-sort the asset list: explicit priority, then kind, then original
    /// insertion order.
    pub fn resort(&mut self) {
        let assets = &self.assets;
        self.order.sort_by_key(|id| {
            assets
                .get(id)
                .map(|r| (r.priority, r.kind, r.insertion))
                .unwrap_or((i32::MAX, AssetKind::Animation, u64::MAX))
        });
    }

    /// Remove every record whose source file no longer exists.
    /// Returns the removed records.
    pub fn prune_missing_sources(&mut self) -> Vec<AssetRecord> {
        let gone: Vec<AssetId> = self
            .assets
            .values()
            .filter(|r| !r.source_path.exists())
            .map(|r| r.id)
            .collect();

        let mut removed = Vec::new();
        for id in gone {
            if let Some(record) = self.assets.remove(&id) {
                self.by_path.remove(&record.source_path);
                self.by_name.remove(&record.canonical_name);
                self.order.retain(|&o| o != id);
                log::info!("pruned asset '{}' (source removed)", record.canonical_name);
                removed.push(record);
            }
        }
        removed
    }

    /// Assets whose importer claims a dependency on `changed`.
    pub fn dependents_of(&self, changed: &Path) -> Vec<AssetId> {
        self.assets
            .values()
            .filter(|record| {
                self.importer_for(record)
                    .and_then(|imp| imp.depends_on)
                    .is_some_and(|depends| depends(record, changed))
            })
            .map(|r| r.id)
            .collect()
    }

    /// Number of registered assets.
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// True if no assets are registered.
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

impl Default for AssetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

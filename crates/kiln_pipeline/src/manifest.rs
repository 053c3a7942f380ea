//! Generated-code manifest regeneration.
//!
//! The manifest is re-derived purely from the built target tree on disk, so
//! regenerating against an unchanged output directory is byte-identical.
//! Two artifacts are written: a generated Rust source file with typed
//! entries, load/unload drivers and an editor-only hot-reload lookup, and a
//! companion JSON declarations file for external tools (live game client,
//! build inspection).

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use kiln_asset::AssetKind;
use serde::Serialize;

use crate::PipelineError;

/// One manifest entry: a built target file.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Canonical asset name (the target file stem).
    pub name: String,
    /// Target path relative to the output directory, forward slashes.
    pub path: String,
    /// Asset kind (target subdirectory name).
    pub kind: String,
}

#[derive(Serialize)]
struct ManifestDoc<'a> {
    version: u32,
    assets: &'a [ManifestEntry],
}

/// Regenerate the manifest pair from the target files under `output_dir`.
///
/// Writes `manifest_path` (Rust source) and the companion declarations file
/// next to it (same stem, `.json`). Idempotent for an unchanged tree.
pub fn regenerate(output_dir: &Path, manifest_path: &Path) -> Result<(), PipelineError> {
    let entries = collect_entries(output_dir)?;

    let source = render_source(&entries);
    let declarations = render_declarations(&entries)?;

    if let Some(parent) = manifest_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(manifest_path, source)?;
    std::fs::write(manifest_path.with_extension("json"), declarations)?;

    log::info!(
        "regenerated manifest {:?} ({} assets)",
        manifest_path,
        entries.len()
    );
    Ok(())
}

/// Enumerate target files, grouped by kind directory, sorted by path.
/// Files outside a recognized kind directory are not assets and are ignored.
pub fn collect_entries(output_dir: &Path) -> Result<Vec<ManifestEntry>, PipelineError> {
    let mut entries = Vec::new();

    for kind in AssetKind::ALL {
        let kind_dir = output_dir.join(kind.dir_name());
        if !kind_dir.is_dir() {
            continue;
        }

        let mut files = BTreeSet::new();
        collect_files(&kind_dir, &mut files)?;

        for file in files {
            let Some(stem) = file.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let relative = file
                .strip_prefix(output_dir)
                .unwrap_or(&file)
                .to_string_lossy()
                .replace('\\', "/");
            entries.push(ManifestEntry {
                name: stem.to_string(),
                path: relative,
                kind: kind.dir_name().to_string(),
            });
        }
    }

    Ok(entries)
}

fn collect_files(dir: &Path, out: &mut BTreeSet<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else if path.is_file() {
            // The manifest's own artifacts may live in the output tree.
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name.ends_with(".rs") || name.ends_with(".json") || name.ends_with(".tmp") {
                continue;
            }
            out.insert(path);
        }
    }
    Ok(())
}

fn render_source(entries: &[ManifestEntry]) -> String {
    let mut s = String::new();
    s.push_str("//! Generated asset manifest. Do not edit; regenerate with `kiln build`.\n\n");
    s.push_str("/// One built asset target.\n");
    s.push_str("#[derive(Debug, Clone, Copy)]\n");
    s.push_str("pub struct AssetEntry {\n");
    s.push_str("    pub name: &'static str,\n");
    s.push_str("    pub path: &'static str,\n");
    s.push_str("    pub kind: &'static str,\n");
    s.push_str("}\n");

    let mut all_refs: Vec<String> = Vec::new();
    let mut dispatch: Vec<(String, String)> = Vec::new();
    let mut seen_names: BTreeSet<String> = BTreeSet::new();

    for kind in AssetKind::ALL {
        let kind_entries: Vec<&ManifestEntry> = entries
            .iter()
            .filter(|e| e.kind == kind.dir_name())
            .collect();
        if kind_entries.is_empty() {
            continue;
        }

        s.push('\n');
        s.push_str(&format!("pub mod {} {{\n", kind.dir_name()));
        s.push_str("    use super::AssetEntry;\n");
        for entry in kind_entries {
            if !seen_names.insert(entry.name.clone()) {
                log::warn!("duplicate manifest name '{}' skipped", entry.name);
                continue;
            }
            let const_name = entry.name.to_uppercase();
            s.push('\n');
            s.push_str(&format!("    pub const {}: AssetEntry = AssetEntry {{\n", const_name));
            s.push_str(&format!("        name: \"{}\",\n", entry.name));
            s.push_str(&format!("        path: \"{}\",\n", entry.path));
            s.push_str(&format!("        kind: \"{}\",\n", entry.kind));
            s.push_str("    };\n");

            let full = format!("{}::{}", kind.dir_name(), const_name);
            all_refs.push(format!("&{}", full));
            dispatch.push((entry.name.clone(), full));
        }
        s.push_str("}\n");
    }

    s.push('\n');
    s.push_str("/// Every built asset, grouped by kind, sorted by target path.\n");
    s.push_str(&format!(
        "pub const ALL: &[&AssetEntry] = &[{}];\n",
        all_refs.join(", ")
    ));

    s.push('\n');
    s.push_str("/// Invoke `load` for every asset in manifest order.\n");
    s.push_str(
        "pub fn load_all<E>(mut load: impl FnMut(&'static AssetEntry) -> Result<(), E>) -> Result<(), E> {\n",
    );
    s.push_str("    for entry in ALL {\n");
    s.push_str("        load(entry)?;\n");
    s.push_str("    }\n");
    s.push_str("    Ok(())\n");
    s.push_str("}\n");

    s.push('\n');
    s.push_str("/// Invoke `unload` for every asset in reverse manifest order.\n");
    s.push_str("pub fn unload_all(mut unload: impl FnMut(&'static AssetEntry)) {\n");
    s.push_str("    for entry in ALL.iter().rev() {\n");
    s.push_str("        unload(entry);\n");
    s.push_str("    }\n");
    s.push_str("}\n");

    s.push('\n');
    s.push_str("/// Editor builds: look up the entry for a hot-reloaded asset.\n");
    s.push_str("#[cfg(feature = \"editor\")]\n");
    s.push_str("pub fn hot_reload_entry(name: &str) -> Option<&'static AssetEntry> {\n");
    s.push_str("    match name {\n");
    for (name, path) in &dispatch {
        s.push_str(&format!("        \"{}\" => Some(&{}),\n", name, path));
    }
    s.push_str("        _ => None,\n");
    s.push_str("    }\n");
    s.push_str("}\n");

    s
}

fn render_declarations(entries: &[ManifestEntry]) -> Result<String, PipelineError> {
    let doc = ManifestDoc {
        version: 1,
        assets: entries,
    };
    let mut json = serde_json::to_string_pretty(&doc)?;
    json.push('\n');
    Ok(json)
}

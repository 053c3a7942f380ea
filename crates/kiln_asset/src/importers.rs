//! Built-in import functions.
//!
//! Only the texture importer does real decoding; mesh, skeleton and
//! animation payloads are produced by external editors in their final
//! binary form, so their importers validate and wrap the payload behind
//! the standard target header.

use std::io::Write;

use crate::error::ImportError;
use crate::kind::AssetKind;
use crate::meta::SidecarMeta;
use crate::props::Properties;
use crate::registry::{AssetRecord, Importer};

/// Target format version shared by the built-in importers.
pub const TARGET_VERSION: u32 = 1;

/// Write the self-describing target header: signature then version,
/// little-endian. Downstream loaders validate these before the payload.
pub fn write_header(out: &mut dyn Write, signature: [u8; 4], version: u32) -> std::io::Result<()> {
    out.write_all(&signature)?;
    out.write_all(&version.to_le_bytes())?;
    Ok(())
}

/// The default importer set.
pub fn defaults() -> Vec<Importer> {
    vec![
        Importer {
            kind: AssetKind::Texture,
            extensions: &["png", "jpg", "jpeg", "bmp", "tga"],
            signature: *b"KTEX",
            version: TARGET_VERSION,
            import: import_texture,
            depends_on: None,
        },
        Importer {
            kind: AssetKind::Mesh,
            extensions: &["mesh"],
            signature: *b"KMSH",
            version: TARGET_VERSION,
            import: import_mesh,
            depends_on: None,
        },
        Importer {
            kind: AssetKind::Skeleton,
            extensions: &["skel"],
            signature: *b"KSKL",
            version: TARGET_VERSION,
            import: import_skeleton,
            depends_on: None,
        },
        Importer {
            kind: AssetKind::Animation,
            extensions: &["anim"],
            signature: *b"KANM",
            version: TARGET_VERSION,
            import: import_animation,
            depends_on: None,
        },
    ]
}

/// Decode the source image and write RGBA8 pixels behind the header.
fn import_texture(
    record: &AssetRecord,
    out: &mut dyn Write,
    _config: &Properties,
    _meta: &SidecarMeta,
) -> Result<(), ImportError> {
    let data = std::fs::read(&record.source_path)?;
    let img = image::load_from_memory(&data).map_err(|e| ImportError::Malformed {
        kind: "texture",
        path: record.source_path.clone(),
        message: e.to_string(),
    })?;

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();

    write_header(out, *b"KTEX", TARGET_VERSION)?;
    out.write_all(&width.to_le_bytes())?;
    out.write_all(&height.to_le_bytes())?;
    out.write_all(rgba.as_raw())?;
    Ok(())
}

fn import_passthrough(
    record: &AssetRecord,
    out: &mut dyn Write,
    signature: [u8; 4],
    kind: &'static str,
) -> Result<(), ImportError> {
    let data = std::fs::read(&record.source_path)?;
    if data.is_empty() {
        return Err(ImportError::Malformed {
            kind,
            path: record.source_path.clone(),
            message: "empty payload".to_string(),
        });
    }
    write_header(out, signature, TARGET_VERSION)?;
    out.write_all(&data)?;
    Ok(())
}

fn import_mesh(
    record: &AssetRecord,
    out: &mut dyn Write,
    _config: &Properties,
    _meta: &SidecarMeta,
) -> Result<(), ImportError> {
    import_passthrough(record, out, *b"KMSH", "mesh")
}

fn import_skeleton(
    record: &AssetRecord,
    out: &mut dyn Write,
    _config: &Properties,
    _meta: &SidecarMeta,
) -> Result<(), ImportError> {
    import_passthrough(record, out, *b"KSKL", "skeleton")
}

fn import_animation(
    record: &AssetRecord,
    out: &mut dyn Write,
    _config: &Properties,
    _meta: &SidecarMeta,
) -> Result<(), ImportError> {
    import_passthrough(record, out, *b"KANM", "animation")
}

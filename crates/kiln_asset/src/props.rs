//! Line-oriented key/value properties format.
//!
//! Shared by the pipeline configuration file and `.meta` sidecars:
//! `key = value` per line, `#` or `;` starts a comment, whitespace is
//! trimmed on both sides of the `=`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Parsed properties file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: BTreeMap<String, String>,
}

impl Properties {
    /// Empty property set (all defaults).
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from text. Lines without `=` are ignored with a debug log.
    pub fn parse(text: &str) -> Self {
        let mut entries = BTreeMap::new();
        for (line_no, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            match line.split_once('=') {
                Some((key, value)) => {
                    entries.insert(key.trim().to_string(), value.trim().to_string());
                }
                None => {
                    log::debug!("ignoring malformed property line {}: {:?}", line_no + 1, raw);
                }
            }
        }
        Self { entries }
    }

    /// Read and parse a file.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        Ok(Self::parse(&std::fs::read_to_string(path)?))
    }

    /// Raw string value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|s| s.as_str())
    }

    /// Value as a path.
    pub fn get_path(&self, key: &str) -> Option<PathBuf> {
        self.get(key).map(PathBuf::from)
    }

    /// Value parsed as u64; parse failures fall back to `None`.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key)?.parse().ok()
    }

    /// Value parsed as i32.
    pub fn get_i32(&self, key: &str) -> Option<i32> {
        self.get(key)?.parse().ok()
    }

    /// Value parsed as bool (`true`/`false`/`1`/`0`).
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            other => {
                log::debug!("ignoring non-boolean value {:?} for key {:?}", other, key);
                None
            }
        }
    }

    /// All `(key, value)` pairs whose key starts with `prefix`, in sorted
    /// key order.
    pub fn keys_with_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no entries were parsed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

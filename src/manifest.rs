//! Asset manifest: logical asset name (chunk name + extension) to public URL.

use crate::host::BuildStats;
use std::collections::HashMap;
use std::path::Path;

/// Mapping built once per emit pass from that pass's statistics.
///
/// Never carry one across passes: chunk hashes change between incremental
/// builds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetManifest {
    entries: HashMap<String, String>,
}

impl AssetManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, url: impl Into<String>) {
        self.entries.insert(name.into(), url.into());
    }

    /// Raw entry, including empty URLs recorded when no public path is set.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    /// URL to rewrite `name` to. Empty URLs do not count as a hit.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|url| !url.is_empty())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AssetManifest {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut manifest = Self::new();
        for (name, url) in iter {
            manifest.insert(name, url);
        }
        manifest
    }
}

/// Builds the manifest from the host's chunk statistics.
///
/// Keys are `<group><.ext>`. When a group holds several files with the same
/// extension the last one wins; this is a known limitation kept for
/// compatibility.
pub fn build_manifest(stats: &BuildStats) -> AssetManifest {
    let public_path = stats.public_path.as_deref().unwrap_or("");
    let mut manifest = AssetManifest::new();

    for (group, files) in &stats.assets_by_chunk_name {
        for file in files.as_slice() {
            let url = if public_path.is_empty() {
                String::new()
            } else {
                format!("{public_path}{file}")
            };
            manifest.insert(format!("{group}{}", extension_of(file)), url);
        }
    }

    manifest
}

/// Extension including the leading dot, or "" when the file has none.
fn extension_of(file: &str) -> String {
    Path::new(file)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

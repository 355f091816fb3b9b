//! Pipeline options.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Pure path-to-name transform. Build names and output files are derived
/// from its result, so equal inputs must give equal outputs.
pub type NameTransform = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Configuration for the page sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxConfig {
    /// Maximum heap size in bytes (default: 64MB, None = unlimited)
    pub max_heap_size: Option<usize>,
    /// Maximum time for evaluating a page in milliseconds (default: 30000ms, None = unlimited)
    pub timeout_ms: Option<u64>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_heap_size: Some(64 * 1024 * 1024),
            timeout_ms: Some(30_000),
        }
    }
}

#[derive(Clone)]
pub struct PageOptions {
    /// Glob pattern for page sources, relative to `cwd`.
    pub files: String,
    /// Base directory for `files`.
    pub cwd: PathBuf,
    /// Maps a matched relative path to the page's output name.
    pub output_page_name: Option<NameTransform>,
    /// Overrides the child build's output file name.
    pub entry_name: Option<NameTransform>,
    pub sandbox: SandboxConfig,
}

impl PageOptions {
    pub fn new(files: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            files: files.into(),
            cwd: cwd.into(),
            output_page_name: None,
            entry_name: None,
            sandbox: SandboxConfig::default(),
        }
    }

    pub fn output_page_name(mut self, f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.output_page_name = Some(Arc::new(f));
        self
    }

    pub fn entry_name(mut self, f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.entry_name = Some(Arc::new(f));
        self
    }

    pub fn sandbox(mut self, sandbox: SandboxConfig) -> Self {
        self.sandbox = sandbox;
        self
    }
}

impl fmt::Debug for PageOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageOptions")
            .field("files", &self.files)
            .field("cwd", &self.cwd)
            .field("output_page_name", &self.output_page_name.is_some())
            .field("entry_name", &self.entry_name.is_some())
            .field("sandbox", &self.sandbox)
            .finish()
    }
}

/// Replaces the extension of a page path, e.g. `about/index.js` → `about/index.html`.
pub fn with_extension(path: &str, ext: &str) -> String {
    let file_start = path.rfind('/').map_or(0, |i| i + 1);
    let stem_end = path[file_start..]
        .rfind('.')
        .filter(|&i| i > 0)
        .map_or(path.len(), |i| file_start + i);

    let ext = ext.trim_start_matches('.');
    if ext.is_empty() {
        path[..stem_end].to_string()
    } else {
        format!("{}.{}", &path[..stem_end], ext)
    }
}

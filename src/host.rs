//! Contracts the pipeline expects from its host build.
//!
//! The host owns the dependency graph, module resolution, loaders and final
//! artifact writing. The pipeline only needs to spawn isolated child builds,
//! read the build statistics, register assets and report diagnostics.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};

/// A build output: the final text and its encoded size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    content: String,
}

impl Asset {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.content
    }

    /// Size in UTF-8 bytes.
    pub fn size(&self) -> usize {
        self.content.len()
    }

    pub fn into_source(self) -> String {
        self.content
    }
}

/// A message surfaced through the host build's own error reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    /// Nested cause, e.g. the loader error behind "Module build failed".
    pub cause: Option<String>,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(message: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: Some(cause.into()),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}:\n{}", self.message, cause),
            None => f.write_str(&self.message),
        }
    }
}

/// Environment a child build must produce code for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildTarget {
    /// Runs outside a browser in an isolated host-side sandbox and exposes a
    /// single value (script completion value or `module.exports`).
    Sandbox,
}

/// Configuration of one isolated child build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildBuildConfig {
    /// The single entry point.
    pub entry: PathBuf,
    /// Module resolution root, shared with the parent build.
    pub context: PathBuf,
    /// The single output file name.
    pub filename: String,
    pub public_path: Option<String>,
    pub target: BuildTarget,
    /// Key under which the child may keep its module cache.
    pub cache_namespace: String,
}

/// What a finished child build hands back.
#[derive(Debug, Clone, Default)]
pub struct ChildBuildOutput {
    /// Fatal diagnostics; non-empty means the build failed.
    pub errors: Vec<Diagnostic>,
    pub asset: Option<Asset>,
}

pub trait ChildBuild {
    /// Runs the child build to completion.
    fn run(self) -> impl Future<Output = anyhow::Result<ChildBuildOutput>>;
}

/// Files produced for one named chunk group. Stats may list a single file
/// as a bare string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ChunkFiles {
    One(String),
    Many(Vec<String>),
}

impl ChunkFiles {
    pub fn as_slice(&self) -> &[String] {
        match self {
            Self::One(file) => std::slice::from_ref(file),
            Self::Many(files) => files,
        }
    }
}

/// The subset of the host's build statistics the manifest is built from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStats {
    #[serde(default)]
    pub public_path: Option<String>,
    #[serde(default)]
    pub assets_by_chunk_name: BTreeMap<String, ChunkFiles>,
}

impl BuildStats {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// The parent build the pipeline is plugged into.
pub trait HostBuild {
    type Child: ChildBuild;

    /// Base directory of the parent build.
    fn context(&self) -> &Path;

    fn public_path(&self) -> Option<&str>;

    fn create_child_build(&self, name: &str, config: ChildBuildConfig) -> Self::Child;

    /// Statistics of the current pass. Must reflect the latest chunk hashes.
    fn stats(&self) -> impl Future<Output = anyhow::Result<BuildStats>>;

    fn emit_asset(&mut self, filename: String, asset: Asset);

    fn push_error(&mut self, error: Diagnostic);
}

//! # Page Pipeline
//!
//! Renders HTML pages as a secondary pass inside a host build and points
//! their `<link>`/`<script>` tags at the host's hashed output files.
//!
//! ## Phases
//!
//! - **make**: discover page sources, compile each one as an isolated child
//!   build of the host (all pages concurrently)
//! - **emit**: build the asset manifest from the host's statistics, evaluate
//!   each compiled page in a sandboxed V8 isolate, rewrite its asset URLs and
//!   register the HTML as a host asset
//!
//! A page that fails to compile or evaluate is reported through the host's
//! diagnostics and withheld; the other pages still come out.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use page_pipeline::{FsBuild, PageOptions, PagePipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut host = FsBuild::new(".").with_stats_file(Some("dist/stats.json".into()));
//!     let options = PageOptions::new("**/*.page.js", "src/pages")
//!         .output_page_name(|p| page_pipeline::with_extension(p, "html"));
//!
//!     PagePipeline::new(options).run(&mut host).await?;
//!     host.write_assets("dist".as_ref()).await?;
//!     Ok(())
//! }
//! ```

mod config;
mod discovery;
mod error;
mod fs_host;
mod host;
mod manifest;
mod ops;
mod orchestrator;
mod pipeline;
mod rewrite;
mod sandbox;

pub use config::{with_extension, NameTransform, PageOptions, SandboxConfig};
pub use discovery::{discover_pages, PageSpec};
pub use error::PageError;
pub use fs_host::{FsBuild, FsChildBuild};
pub use host::{
    Asset, BuildStats, BuildTarget, ChildBuild, ChildBuildConfig, ChildBuildOutput, ChunkFiles,
    Diagnostic, HostBuild,
};
pub use manifest::{build_manifest, AssetManifest};
pub use ops::{ConsoleLevel, ConsoleOutput};
pub use orchestrator::{build_name, compile_all, compile_page, CompilationResult};
pub use pipeline::{EmitReport, MadePages, PagePipeline};
pub use rewrite::{attributes, rewrite, scan_tags, Attribute, Tag, TagKind, SKIP_MARKER};
pub use sandbox::{execute_page, PageOutput, PageTemplate, RenderedPage};

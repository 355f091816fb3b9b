//! Page pipeline controller: the two phases run inside the host build.
//!
//! ```text
//!  make:  discover ──► compile_all (concurrent child builds) ──► MadePages
//!  emit:  stats ──► manifest ──► per page: execute ──► rewrite ──► emit_asset
//! ```
//!
//! `make` hands its results back as a value, which the caller passes to
//! `emit`; the controller keeps no state between the two.

use crate::config::PageOptions;
use crate::discovery::discover_pages;
use crate::error::PageError;
use crate::host::{Asset, HostBuild};
use crate::manifest::build_manifest;
use crate::orchestrator::{compile_all, CompilationResult};
use crate::rewrite::rewrite;
use crate::sandbox::{execute_page, RenderedPage};

/// Output of the make phase, consumed by the emit phase.
#[derive(Debug, Default)]
pub struct MadePages {
    pub compiled: Vec<CompilationResult>,
    /// Pages whose child build failed; already reported to the host.
    pub failed: usize,
}

/// Outcome of the emit phase.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EmitReport {
    /// Output file names registered with the host, in processing order.
    pub emitted: Vec<String>,
    /// Pages withheld because execution failed.
    pub failed: usize,
}

pub struct PagePipeline {
    options: PageOptions,
}

impl PagePipeline {
    pub fn new(options: PageOptions) -> Self {
        Self { options }
    }

    /// Discovers pages and compiles them all concurrently.
    ///
    /// Per-page failures are pushed to the host and leave the other pages
    /// intact. A discovery failure aborts the phase.
    pub async fn make<H: HostBuild>(&self, host: &mut H) -> Result<MadePages, PageError> {
        let pages = match discover_pages(&self.options) {
            Ok(pages) => pages,
            Err(e) => {
                host.push_error(e.to_diagnostic());
                return Err(e);
            }
        };
        tracing::debug!(count = pages.len(), pattern = %self.options.files, "discovered pages");

        let results = compile_all(&*host, &pages, &self.options).await;

        let mut made = MadePages::default();
        for (page, result) in pages.iter().zip(results) {
            match result {
                Ok(compiled) => made.compiled.push(compiled),
                Err(e) => {
                    match &e {
                        PageError::ChildBuildFailure { build_name, .. } => {
                            tracing::debug!(build = %build_name, "child build failed")
                        }
                        _ => tracing::debug!(page = %page.source_path.display(), "{e}"),
                    }
                    host.push_error(e.to_diagnostic());
                    made.failed += 1;
                }
            }
        }

        tracing::info!(
            compiled = made.compiled.len(),
            failed = made.failed,
            "page child builds settled"
        );
        Ok(made)
    }

    /// Executes each compiled page, rewrites its asset links and registers
    /// the HTML with the host.
    ///
    /// The manifest is built once from this pass's statistics. A failing
    /// page is reported and withheld; pages already emitted stay emitted.
    pub async fn emit<H: HostBuild>(
        &self,
        host: &mut H,
        made: MadePages,
    ) -> Result<EmitReport, PageError> {
        let stats = match host.stats().await {
            Ok(stats) => stats,
            Err(e) => {
                let e = PageError::Stats(format!("{e:#}"));
                host.push_error(e.to_diagnostic());
                return Err(e);
            }
        };
        let manifest = build_manifest(&stats);
        tracing::debug!(entries = manifest.len(), "asset manifest built");

        let mut report = EmitReport::default();
        for compiled in made.compiled {
            let filename = compiled.filename.clone();
            match self.render(compiled) {
                Ok(page) => {
                    log_console(&filename, &page);
                    let html = rewrite(&page.html, &manifest);
                    host.emit_asset(filename.clone(), Asset::new(html));
                    report.emitted.push(filename);
                }
                Err(e) => {
                    tracing::debug!(page = %filename, "page execution failed");
                    host.push_error(e.to_diagnostic());
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            emitted = report.emitted.len(),
            failed = report.failed,
            "pages emitted"
        );
        Ok(report)
    }

    /// Runs `make` followed by `emit`.
    pub async fn run<H: HostBuild>(&self, host: &mut H) -> Result<EmitReport, PageError> {
        let made = self.make(host).await?;
        self.emit(host, made).await
    }

    fn render(&self, compiled: CompilationResult) -> Result<RenderedPage, PageError> {
        execute_page(compiled.module.source(), &compiled.filename, &self.options.sandbox)?.render()
    }
}

fn log_console(filename: &str, page: &RenderedPage) {
    if page.console.is_empty() {
        return;
    }
    for line in &page.console.logs {
        tracing::debug!(page = %filename, "{line}");
    }
    for line in &page.console.warns {
        tracing::warn!(page = %filename, "{line}");
    }
    for line in &page.console.errors {
        tracing::warn!(page = %filename, "console.error: {line}");
    }
}

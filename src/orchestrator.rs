//! Compiles each page as its own isolated child build of the host.

use crate::config::PageOptions;
use crate::discovery::PageSpec;
use crate::error::PageError;
use crate::host::{Asset, BuildTarget, ChildBuild, ChildBuildConfig, Diagnostic, HostBuild};
use deno_core::futures::future::join_all;
use std::path::Path;

/// A page whose child build succeeded, ready for execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationResult {
    pub filename: String,
    pub module: Asset,
}

/// Name of a page's child build. Derived from the full path so pages that
/// share a file name in different directories never share a build name or
/// cache namespace.
pub fn build_name(context: &Path, page: &Path) -> String {
    let absolute = page.to_string_lossy();
    let shown = match page.strip_prefix(context) {
        Ok(relative) => {
            let relative = relative.to_string_lossy();
            if absolute.len() < relative.len() {
                absolute
            } else {
                relative
            }
        }
        Err(_) => absolute,
    };
    format!("page-pipeline for \"{shown}\"")
}

/// Builds the child configuration for one page.
pub fn child_config<H: HostBuild>(host: &H, page: &PageSpec, options: &PageOptions) -> ChildBuildConfig {
    let filename = match &options.entry_name {
        Some(entry_name) => entry_name(&page.output_filename),
        None => page.output_filename.clone(),
    };

    ChildBuildConfig {
        entry: page.source_path.clone(),
        context: host.context().to_path_buf(),
        filename,
        public_path: host.public_path().map(String::from),
        target: BuildTarget::Sandbox,
        cache_namespace: build_name(host.context(), &page.source_path),
    }
}

/// Runs the child build for one page and checks its diagnostics.
pub async fn compile_page<H: HostBuild>(
    host: &H,
    page: &PageSpec,
    options: &PageOptions,
) -> Result<CompilationResult, PageError> {
    let config = child_config(host, page, options);
    let name = config.cache_namespace.clone();
    let filename = config.filename.clone();

    tracing::debug!(build = %name, output = %filename, "starting child build");
    let child = host.create_child_build(&name, config);

    let output = match child.run().await {
        Ok(output) => output,
        Err(e) => return Err(PageError::child_build(&name, &[Diagnostic::new(format!("{e:#}"))])),
    };

    if !output.errors.is_empty() {
        return Err(PageError::child_build(&name, &output.errors));
    }

    let module = output
        .asset
        .ok_or_else(|| PageError::MissingCompilationResult {
            filename: filename.clone(),
        })?;

    tracing::debug!(build = %name, bytes = module.size(), "child build finished");
    Ok(CompilationResult { filename, module })
}

/// Compiles every page concurrently. Results keep the order of `pages`;
/// one page failing never affects another.
pub async fn compile_all<H: HostBuild>(
    host: &H,
    pages: &[PageSpec],
    options: &PageOptions,
) -> Vec<Result<CompilationResult, PageError>> {
    join_all(pages.iter().map(|page| compile_page(host, page, options))).await
}

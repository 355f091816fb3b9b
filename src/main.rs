//! Page pipeline CLI
//!
//!   page-pipeline --cwd src/pages --files '**/*.js' --stats dist/stats.json --out dist
//!
//! Pages are read as already-bundled modules unless `--compiler` is given,
//! in which case the command is run once per page through `sh -c` and its
//! stdout is used as the module. The command sees `PAGE_ENTRY`,
//! `PAGE_FILENAME`, `PAGE_CONTEXT`, `PAGE_BUILD_NAME`,
//! `PAGE_CACHE_NAMESPACE` and `PAGE_PUBLIC_PATH`.
//!
//! Exits non-zero when any page was reported as failed.

use anyhow::{bail, Result};
use clap::Parser;
use page_pipeline::{with_extension, FsBuild, PageOptions, PagePipeline, SandboxConfig};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "page-pipeline", version, about = "Render pages and rewrite their asset links")]
struct Args {
    /// Base directory the page pattern is resolved against
    #[arg(long, default_value = ".")]
    cwd: PathBuf,

    /// Glob pattern for page sources, relative to --cwd
    #[arg(long, default_value = "**/*.js")]
    files: String,

    /// Build context for child builds (defaults to the current directory)
    #[arg(long)]
    context: Option<PathBuf>,

    /// Stats JSON of the main build (`publicPath`, `assetsByChunkName`)
    #[arg(long)]
    stats: Option<PathBuf>,

    /// Public path overriding the one in the stats file
    #[arg(long)]
    public_path: Option<String>,

    /// Output directory for rendered pages
    #[arg(long, default_value = "dist")]
    out: PathBuf,

    /// Shell command compiling one page to a module on stdout
    #[arg(long)]
    compiler: Option<String>,

    /// Replace the page file extension in output names (e.g. `html`)
    #[arg(long)]
    page_ext: Option<String>,

    /// Per-page evaluation budget in milliseconds (0 = unlimited)
    #[arg(long, default_value_t = 30_000)]
    timeout_ms: u64,

    /// Sandbox heap limit in MB (0 = unlimited)
    #[arg(long, default_value_t = 64)]
    max_heap_mb: usize,
}

impl Args {
    fn page_options(&self) -> PageOptions {
        let sandbox = SandboxConfig {
            max_heap_size: (self.max_heap_mb > 0).then(|| self.max_heap_mb * 1024 * 1024),
            timeout_ms: (self.timeout_ms > 0).then_some(self.timeout_ms),
        };

        let options = PageOptions::new(self.files.clone(), self.cwd.clone()).sandbox(sandbox);
        match self.page_ext.clone() {
            Some(ext) => options.output_page_name(move |path| with_extension(path, &ext)),
            None => options,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "page_pipeline=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let context = match &args.context {
        Some(context) => context.clone(),
        None => std::env::current_dir()?,
    };

    let mut host = FsBuild::new(context)
        .with_stats_file(args.stats.clone())
        .with_public_path(args.public_path.clone())
        .with_compiler(args.compiler.clone());
    host.load_stats().await?;

    let pipeline = PagePipeline::new(args.page_options());
    let aborted = match pipeline.run(&mut host).await {
        Ok(report) => {
            tracing::debug!(emitted = report.emitted.len(), failed = report.failed, "run finished");
            None
        }
        Err(e) if e.is_batch_level() => Some(e),
        Err(e) => return Err(e.into()),
    };

    let written = host.write_assets(&args.out).await?;
    tracing::info!(pages = written, out = %args.out.display(), "pages written");

    for diagnostic in host.errors() {
        tracing::error!("{diagnostic}");
    }
    if let Some(e) = aborted {
        bail!("page build aborted: {e}");
    }
    if !host.errors().is_empty() {
        bail!("{} page error(s)", host.errors().len());
    }

    Ok(())
}

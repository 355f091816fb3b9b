//! Filesystem host build used by the CLI.
//!
//! Stands in for a bundler when pages are built from the command line:
//! statistics come from a stats JSON file, child builds either read the
//! page as an already-bundled module or pipe it through an external
//! compiler command, and emitted assets are written to an output directory.

use crate::host::{Asset, BuildStats, ChildBuild, ChildBuildConfig, ChildBuildOutput, Diagnostic, HostBuild};
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

pub struct FsBuild {
    context: PathBuf,
    /// Overrides the stats file's `publicPath` when set.
    public_path: Option<String>,
    stats_path: Option<PathBuf>,
    /// Stats read ahead of the build by `load_stats`.
    stats: Option<BuildStats>,
    /// Shell command producing a page module on stdout.
    compiler: Option<String>,
    assets: BTreeMap<String, Asset>,
    errors: Vec<Diagnostic>,
}

impl FsBuild {
    pub fn new(context: impl Into<PathBuf>) -> Self {
        Self {
            context: context.into(),
            public_path: None,
            stats_path: None,
            stats: None,
            compiler: None,
            assets: BTreeMap::new(),
            errors: Vec::new(),
        }
    }

    pub fn with_public_path(mut self, public_path: Option<String>) -> Self {
        self.public_path = public_path;
        self
    }

    pub fn with_stats_file(mut self, path: Option<PathBuf>) -> Self {
        self.stats_path = path;
        self
    }

    pub fn with_compiler(mut self, command: Option<String>) -> Self {
        self.compiler = command;
        self
    }

    /// Reads the stats file now, so its `publicPath` also reaches child
    /// builds. Without it the file is read when the emit phase asks.
    pub async fn load_stats(&mut self) -> Result<()> {
        self.stats = Some(self.read_stats().await?);
        Ok(())
    }

    async fn read_stats(&self) -> Result<BuildStats> {
        let Some(path) = &self.stats_path else {
            return Ok(BuildStats::default());
        };
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read stats file `{}`", path.display()))?;
        BuildStats::from_json(&json)
            .with_context(|| format!("Invalid stats file `{}`", path.display()))
    }

    pub fn assets(&self) -> &BTreeMap<String, Asset> {
        &self.assets
    }

    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    /// Writes every emitted asset below `out_dir`, creating directories.
    pub async fn write_assets(&self, out_dir: &Path) -> Result<usize> {
        for (filename, asset) in &self.assets {
            let path = out_dir.join(filename);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create `{}`", parent.display()))?;
            }
            tokio::fs::write(&path, asset.source())
                .await
                .with_context(|| format!("Failed to write `{}`", path.display()))?;
            tracing::debug!(file = %path.display(), bytes = asset.size(), "asset written");
        }
        Ok(self.assets.len())
    }
}

impl HostBuild for FsBuild {
    type Child = FsChildBuild;

    fn context(&self) -> &Path {
        &self.context
    }

    fn public_path(&self) -> Option<&str> {
        self.public_path
            .as_deref()
            .or_else(|| self.stats.as_ref()?.public_path.as_deref())
    }

    fn create_child_build(&self, name: &str, config: ChildBuildConfig) -> FsChildBuild {
        FsChildBuild {
            name: name.to_string(),
            config,
            compiler: self.compiler.clone(),
        }
    }

    async fn stats(&self) -> Result<BuildStats> {
        let mut stats = match &self.stats {
            Some(stats) => stats.clone(),
            None => self.read_stats().await?,
        };

        if self.public_path.is_some() {
            stats.public_path = self.public_path.clone();
        }
        Ok(stats)
    }

    fn emit_asset(&mut self, filename: String, asset: Asset) {
        self.assets.insert(filename, asset);
    }

    fn push_error(&mut self, error: Diagnostic) {
        self.errors.push(error);
    }
}

pub struct FsChildBuild {
    name: String,
    config: ChildBuildConfig,
    compiler: Option<String>,
}

impl FsChildBuild {
    /// Environment handed to the compiler command.
    fn vars(&self) -> Vec<(&'static str, String)> {
        vec![
            ("PAGE_ENTRY", self.config.entry.display().to_string()),
            ("PAGE_FILENAME", self.config.filename.clone()),
            ("PAGE_CONTEXT", self.config.context.display().to_string()),
            ("PAGE_BUILD_NAME", self.name.clone()),
            ("PAGE_CACHE_NAMESPACE", self.config.cache_namespace.clone()),
            (
                "PAGE_PUBLIC_PATH",
                self.config.public_path.clone().unwrap_or_default(),
            ),
        ]
    }

    async fn read_module(&self) -> Result<ChildBuildOutput> {
        let entry = &self.config.entry;
        match tokio::fs::read_to_string(entry).await {
            Ok(source) => Ok(ChildBuildOutput {
                errors: Vec::new(),
                asset: Some(Asset::new(source)),
            }),
            Err(e) => Ok(ChildBuildOutput {
                errors: vec![Diagnostic::with_cause(
                    format!("Module not found: `{}`", entry.display()),
                    e.to_string(),
                )],
                asset: None,
            }),
        }
    }

    async fn compile(&self, command: &str) -> Result<ChildBuildOutput> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.config.context)
            .envs(self.vars())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to spawn compiler for {}", self.name))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            let cause = stderr.trim();
            let message = format!("Compiler exited with {}", output.status);
            let diagnostic = if cause.is_empty() {
                Diagnostic::new(message)
            } else {
                Diagnostic::with_cause(message, cause)
            };
            return Ok(ChildBuildOutput {
                errors: vec![diagnostic],
                asset: None,
            });
        }

        for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
            tracing::warn!(build = %self.name, "{line}");
        }

        let source = String::from_utf8(output.stdout)
            .map_err(|e| anyhow!("Compiler output for {} is not UTF-8: {}", self.name, e))?;
        Ok(ChildBuildOutput {
            errors: Vec::new(),
            asset: Some(Asset::new(source)),
        })
    }
}

impl ChildBuild for FsChildBuild {
    async fn run(self) -> Result<ChildBuildOutput> {
        match &self.compiler {
            Some(command) => self.compile(command).await,
            None => self.read_module().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{with_extension, PageOptions};
    use crate::pipeline::PagePipeline;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_stats_file_and_public_path_override() {
        let dir = tempdir().unwrap();
        let stats_path = dir.path().join("stats.json");
        fs::write(
            &stats_path,
            r#"{"publicPath": "/assets/", "assetsByChunkName": {"main": "main.1.js"}}"#,
        )
        .unwrap();

        let host = FsBuild::new(dir.path()).with_stats_file(Some(stats_path.clone()));
        assert_eq!(host.stats().await.unwrap().public_path.as_deref(), Some("/assets/"));

        let host = FsBuild::new(dir.path())
            .with_stats_file(Some(stats_path))
            .with_public_path(Some("https://cdn.example.com/".into()));
        assert_eq!(
            host.stats().await.unwrap().public_path.as_deref(),
            Some("https://cdn.example.com/")
        );
    }

    #[tokio::test]
    async fn test_bad_stats_file_is_error() {
        let dir = tempdir().unwrap();
        let stats_path = dir.path().join("stats.json");
        fs::write(&stats_path, "not json").unwrap();

        let host = FsBuild::new(dir.path()).with_stats_file(Some(stats_path));
        assert!(host.stats().await.is_err());
    }

    #[tokio::test]
    async fn test_pipeline_over_filesystem() {
        let dir = tempdir().unwrap();
        let pages = dir.path().join("pages");
        fs::create_dir_all(pages.join("docs")).unwrap();
        fs::write(
            pages.join("index.js"),
            r#"module.exports = '<link href="main.css"><script src="main.js"></script>';"#,
        )
        .unwrap();
        fs::write(pages.join("docs/index.js"), "() => '<h1>Docs</h1>'").unwrap();
        let stats_path = dir.path().join("stats.json");
        fs::write(
            &stats_path,
            r#"{"publicPath": "/", "assetsByChunkName": {"main": ["main.42.js", "main.42.css"]}}"#,
        )
        .unwrap();

        let mut host = FsBuild::new(dir.path()).with_stats_file(Some(stats_path));
        let options =
            PageOptions::new("**/*.js", &pages).output_page_name(|p| with_extension(p, "html"));
        let report = PagePipeline::new(options).run(&mut host).await.unwrap();

        assert_eq!(report.emitted, ["docs/index.html", "index.html"]);
        assert!(host.errors().is_empty());

        let out = dir.path().join("dist");
        assert_eq!(host.write_assets(&out).await.unwrap(), 2);
        assert_eq!(
            fs::read_to_string(out.join("index.html")).unwrap(),
            r#"<link href="/main.42.css"><script src="/main.42.js"></script>"#
        );
        assert_eq!(fs::read_to_string(out.join("docs/index.html")).unwrap(), "<h1>Docs</h1>");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_compiler_command() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("page.txt"), "Hello").unwrap();

        let host = FsBuild::new(dir.path())
            .with_compiler(Some(r#"printf "'<p>%s</p>'" "$(cat "$PAGE_ENTRY")""#.into()));
        let child = host.create_child_build(
            "page-pipeline for \"page.txt\"",
            ChildBuildConfig {
                entry: dir.path().join("page.txt"),
                context: dir.path().to_path_buf(),
                filename: "page.html".into(),
                public_path: None,
                target: crate::host::BuildTarget::Sandbox,
                cache_namespace: "page-pipeline for \"page.txt\"".into(),
            },
        );

        let output = child.run().await.unwrap();
        assert!(output.errors.is_empty());
        assert_eq!(output.asset.unwrap().source(), "'<p>Hello</p>'");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_compiler_reports_stderr() {
        let dir = tempdir().unwrap();
        let host = FsBuild::new(dir.path())
            .with_compiler(Some("echo 'cannot resolve ./missing' >&2; exit 2".into()));
        let child = host.create_child_build(
            "page-pipeline for \"x.js\"",
            ChildBuildConfig {
                entry: dir.path().join("x.js"),
                context: dir.path().to_path_buf(),
                filename: "x.js".into(),
                public_path: None,
                target: crate::host::BuildTarget::Sandbox,
                cache_namespace: "page-pipeline for \"x.js\"".into(),
            },
        );

        let output = child.run().await.unwrap();
        assert!(output.asset.is_none());
        assert_eq!(output.errors.len(), 1);
        assert_eq!(
            output.errors[0].cause.as_deref(),
            Some("cannot resolve ./missing")
        );
    }

    #[tokio::test]
    async fn test_loaded_stats_public_path_reaches_child_builds() {
        let dir = tempdir().unwrap();
        let stats_path = dir.path().join("stats.json");
        fs::write(&stats_path, r#"{"publicPath": "/assets/", "assetsByChunkName": {}}"#).unwrap();

        let mut host = FsBuild::new(dir.path()).with_stats_file(Some(stats_path.clone()));
        assert_eq!(host.public_path(), None);
        host.load_stats().await.unwrap();
        assert_eq!(host.public_path(), Some("/assets/"));

        let host = FsBuild::new(dir.path())
            .with_stats_file(Some(stats_path))
            .with_public_path(Some("/cdn/".into()));
        assert_eq!(host.public_path(), Some("/cdn/"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_compiler_sees_public_path_from_stats() {
        let dir = tempdir().unwrap();
        let pages = dir.path().join("pages");
        fs::create_dir_all(&pages).unwrap();
        fs::write(pages.join("index.js"), "").unwrap();
        let stats_path = dir.path().join("stats.json");
        fs::write(&stats_path, r#"{"publicPath": "/static/", "assetsByChunkName": {}}"#).unwrap();

        let mut host = FsBuild::new(dir.path())
            .with_stats_file(Some(stats_path))
            .with_compiler(Some(r#"printf "'%s'" "$PAGE_PUBLIC_PATH""#.into()));
        host.load_stats().await.unwrap();

        let report = PagePipeline::new(PageOptions::new("*.js", &pages))
            .run(&mut host)
            .await
            .unwrap();

        assert_eq!(report.emitted, ["index.js"]);
        assert_eq!(host.assets()["index.js"].source(), "/static/");
    }

    #[tokio::test]
    async fn test_missing_entry_is_diagnostic() {
        let dir = tempdir().unwrap();
        let host = FsBuild::new(dir.path());
        let child = host.create_child_build(
            "missing",
            ChildBuildConfig {
                entry: dir.path().join("gone.js"),
                context: dir.path().to_path_buf(),
                filename: "gone.js".into(),
                public_path: None,
                target: crate::host::BuildTarget::Sandbox,
                cache_namespace: "missing".into(),
            },
        );

        let output = child.run().await.unwrap();
        assert_eq!(output.errors.len(), 1);
        assert!(output.errors[0].message.starts_with("Module not found"));
    }
}

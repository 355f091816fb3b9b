//! Error taxonomy for the page pipeline.
//!
//! Per-page variants are turned into host diagnostics and only withhold the
//! page that produced them. `InvalidPattern`, `Discovery` and `Stats` are
//! batch-level and abort the phase they occur in.

use crate::host::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PageError {
    /// The page's child build reported one or more fatal diagnostics.
    #[error("Child compilation failed:\n{details}")]
    ChildBuildFailure { build_name: String, details: String },

    /// Evaluating the compiled module threw (or ran out of time).
    #[error("Page compilation failed: {message}")]
    PageExecutionFailure { filename: String, message: String },

    /// The module evaluated to something other than a string or a function.
    #[error("The page \"{filename}\" didn't return html")]
    InvalidPageResult { filename: String },

    /// A child build finished cleanly but produced no module.
    #[error("The child compilation for \"{filename}\" didn't provide a result")]
    MissingCompilationResult { filename: String },

    #[error("Invalid page pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("Page discovery failed in `{0}`")]
    Discovery(PathBuf, #[source] std::io::Error),

    // NOTE: collaborator errors arrive as anyhow, flattened to keep the chain readable
    #[error("Failed to read build statistics: {0}")]
    Stats(String),
}

impl PageError {
    /// Builds a `ChildBuildFailure` from the diagnostics of a child build.
    pub fn child_build(build_name: &str, diagnostics: &[Diagnostic]) -> Self {
        let details = diagnostics
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");

        Self::ChildBuildFailure {
            build_name: build_name.to_string(),
            details,
        }
    }

    /// Whether this error aborts the whole phase rather than a single page.
    pub fn is_batch_level(&self) -> bool {
        matches!(
            self,
            Self::InvalidPattern { .. } | Self::Discovery(..) | Self::Stats(_)
        )
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::new(self.to_string())
    }
}

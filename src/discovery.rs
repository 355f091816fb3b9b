//! Page discovery: glob pattern + base directory → ordered [`PageSpec`]s.

use crate::config::PageOptions;
use crate::error::PageError;
use glob::{MatchOptions, Pattern};
use std::path::{Component, Path, PathBuf};

/// One discovered page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSpec {
    pub source_path: PathBuf,
    /// Relative path (`/`-separated) after `output_page_name`.
    pub output_filename: String,
}

/// Finds page sources under `options.cwd` matching `options.files`.
///
/// No match is an empty list. A missing base directory or a malformed
/// pattern fails the whole batch.
pub fn discover_pages(options: &PageOptions) -> Result<Vec<PageSpec>, PageError> {
    let cwd = &options.cwd;
    let metadata =
        std::fs::metadata(cwd).map_err(|e| PageError::Discovery(cwd.clone(), e))?;
    if !metadata.is_dir() {
        return Err(PageError::Discovery(
            cwd.clone(),
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
        ));
    }

    let base = glob_base(cwd);
    let pattern = if base.as_os_str().is_empty() {
        options.files.clone()
    } else {
        let escaped = Pattern::escape(&base.to_string_lossy());
        format!("{}/{}", escaped.trim_end_matches('/'), options.files)
    };
    let match_options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };

    let paths = glob::glob_with(&pattern, match_options).map_err(|source| {
        PageError::InvalidPattern {
            pattern: options.files.clone(),
            source,
        }
    })?;

    let mut relative = Vec::new();
    for entry in paths {
        let path = entry.map_err(|e| PageError::Discovery(e.path().to_path_buf(), e.into_error()))?;
        if !path.is_file() {
            continue;
        }
        let rel = path.strip_prefix(&base).map_err(|_| {
            PageError::Discovery(
                path.clone(),
                std::io::Error::other(format!("match is outside `{}`", cwd.display())),
            )
        })?;
        relative.push(to_slash(rel));
    }
    relative.sort();
    relative.dedup();

    Ok(relative
        .into_iter()
        .map(|rel| {
            let output_filename = match &options.output_page_name {
                Some(rename) => rename(&rel),
                None => rel.clone(),
            };
            PageSpec {
                source_path: cwd.join(&rel),
                output_filename,
            }
        })
        .collect())
}

/// `cwd` without `.` components, which glob leaves out of the paths it
/// yields. Empty for the current directory.
fn glob_base(cwd: &Path) -> PathBuf {
    cwd.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

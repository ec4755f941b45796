//! Fixed, read-only catalog of items to compare.

use std::path::Path;
use std::sync::Arc;

use crate::error::AppError;

/// Immutable item catalog shared by the sampler and every round.
///
/// Cloning is cheap; all clones share the same backing slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    items: Arc<[String]>,
}

impl Catalog {
    /// Create a catalog from a list of item identifiers.
    pub fn new<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            items: items.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a newline-delimited catalog. Blank lines and `#` comments are skipped.
    pub fn parse(contents: &str) -> Self {
        Self::new(
            contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#')),
        )
    }

    /// Load a newline-delimited catalog file.
    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let contents = std::fs::read_to_string(path).map_err(|e| AppError::Config {
            message: format!("Failed to read catalog {}: {}", path.display(), e),
        })?;
        Ok(Self::parse(&contents))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.items.get(index).map(String::as_str)
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    /// Human-readable name for the item at `index`.
    pub fn display_name(&self, index: usize) -> Option<String> {
        self.get(index).map(format_repo_name)
    }
}

/// Strip the GitHub host prefix from a repository URL.
///
/// `https://github.com/user/repo` and `github.com/user/repo` both become
/// `user/repo`; anything else is returned unchanged.
pub fn format_repo_name(repo_url: &str) -> String {
    let rest = repo_url.strip_prefix("https://").unwrap_or(repo_url);
    match rest.strip_prefix("github.com/") {
        Some(name) => name.to_string(),
        None => repo_url.to_string(),
    }
}

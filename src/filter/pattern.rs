//! Name pattern matching

use crate::types::SyncError;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::Path;

/// Pattern that matches every file name on its own
pub const MATCH_ALL: &str = "*.*";

/// Compiled set of case-insensitive name globs.
///
/// An empty set, or any set containing `*.*`, matches every name. Blank
/// entries are ignored.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<String>,
    globs: Option<GlobSet>,
}

impl PatternSet {
    /// Compile a list of glob expressions
    pub fn compile(patterns: &[String]) -> Result<Self, SyncError> {
        let meaningful: Vec<&String> = patterns.iter().filter(|p| !p.trim().is_empty()).collect();
        let match_all = meaningful.iter().any(|p| p.trim() == MATCH_ALL);

        if meaningful.is_empty() {
            return Ok(Self {
                patterns: patterns.to_vec(),
                globs: None,
            });
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in meaningful.into_iter().filter(|p| p.trim() != MATCH_ALL) {
            let glob = GlobBuilder::new(pattern.trim())
                .case_insensitive(true)
                .literal_separator(true)
                .build()
                .map_err(|e| {
                    SyncError::Validation(format!("Invalid file pattern '{}': {}", pattern, e))
                })?;
            builder.add(glob);
        }

        let globs = builder
            .build()
            .map_err(|e| SyncError::Validation(format!("Failed to build pattern set: {}", e)))?;

        // Other entries are still compiled so a typo next to `*.*` is reported
        Ok(Self {
            patterns: patterns.to_vec(),
            globs: if match_all { None } else { Some(globs) },
        })
    }

    /// Whether this set lets every name through
    pub fn matches_all(&self) -> bool {
        self.globs.is_none()
    }

    /// Match a bare file name
    pub fn is_match(&self, file_name: &str) -> bool {
        match &self.globs {
            None => true,
            Some(globs) => globs.is_match(file_name),
        }
    }

    /// Match the final component of a path
    pub fn is_path_match(&self, path: &Path) -> bool {
        if self.globs.is_none() {
            return true;
        }
        path.file_name()
            .map(|name| self.is_match(&name.to_string_lossy()))
            .unwrap_or(false)
    }

    /// Source expressions, as given
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

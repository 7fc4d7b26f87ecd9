//! Inclusion/exclusion glob rules evaluated against a source tree.
//!
//! A [`GlobRule`] holds one inclusion pattern and any number of exclusion
//! patterns. Patterns use shell syntax (`*`, `?`, `[abc]`, `{a,b}`, `**`) and
//! are matched against paths relative to the root being scanned, with `*`
//! never crossing a `/`. Exclusions are tested against the same relative
//! paths as the inclusion.
//!
//! When the inclusion matches a directory, everything below it is included as
//! well, except paths that match an exclusion and anything below an excluded
//! directory. Only files and symlinks are reported; directories never are.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{ErrorContext, PackError, Result};

/// Serializable form of a rule, as written in `wfpack.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub include: String,
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// One inclusion pattern plus its exclusions.
#[derive(Debug, Clone)]
pub struct GlobRule {
    include: String,
    exclude: Vec<String>,
    include_matcher: GlobMatcher,
    exclude_set: GlobSet,
}

impl GlobRule {
    /// Rule with an inclusion pattern only.
    pub fn new(include: impl Into<String>) -> Result<Self> {
        Self::with_excludes(include, Vec::<String>::new())
    }

    /// Rule with an inclusion pattern and exclusion patterns.
    ///
    /// # Errors
    /// `InvalidArgument` if a pattern is empty or not valid glob syntax.
    pub fn with_excludes<S: Into<String>>(include: impl Into<String>, exclude: Vec<S>) -> Result<Self> {
        let include = normalize_pattern(include.into());
        let exclude: Vec<String> = exclude.into_iter().map(|p| normalize_pattern(p.into())).collect();

        let include_matcher = compile(&include)?.compile_matcher();

        let mut builder = GlobSetBuilder::new();
        for pattern in &exclude {
            builder.add(compile(pattern)?);
        }
        let exclude_set = builder
            .build()
            .map_err(|e| PackError::invalid_argument("exclude patterns", exclude.join(", "), &e.to_string()))?;

        Ok(Self {
            include,
            exclude,
            include_matcher,
            exclude_set,
        })
    }

    pub fn from_config(rule: &RuleConfig) -> Result<Self> {
        Self::with_excludes(rule.include.clone(), rule.exclude.clone())
    }

    pub fn include_pattern(&self) -> &str {
        &self.include
    }

    /// Return a copy of this rule with one more exclusion.
    pub fn excluding(&self, pattern: impl Into<String>) -> Result<Self> {
        let mut exclude = self.exclude.clone();
        exclude.push(pattern.into());
        Self::with_excludes(self.include.clone(), exclude)
    }

    /// Whether `rel` matches any exclusion pattern.
    pub fn is_excluded(&self, rel: &Path) -> bool {
        self.exclude_set.is_match(rel)
    }

    /// Whether `rel` matches the inclusion and no exclusion.
    ///
    /// This does not apply directory expansion; see [`GlobRule::matches`].
    pub fn matches_path(&self, rel: &Path) -> bool {
        self.include_matcher.is_match(rel) && !self.is_excluded(rel)
    }

    /// Scan `root` and return the relative paths of every selected file or
    /// symlink, sorted by their byte-wise path string.
    ///
    /// Symlinks found in the tree are reported as leaves and never followed.
    pub fn matches(&self, root: &Path) -> Result<Vec<PathBuf>> {
        if !root.is_dir() {
            return Err(PackError::invalid_argument(
                "source directory",
                root.display(),
                "is not a directory",
            ));
        }

        let mut expanded: HashSet<PathBuf> = HashSet::new();
        let mut matched = Vec::new();

        let mut walker = WalkDir::new(root).min_depth(1).follow_links(false).into_iter();
        while let Some(entry) = walker.next() {
            let entry = entry.with_io_context(|| format!("walking {}", root.display()))?;
            let rel = match entry.path().strip_prefix(root) {
                Ok(rel) => rel.to_path_buf(),
                Err(_) => continue,
            };
            let is_dir = entry.file_type().is_dir();

            if self.is_excluded(&rel) {
                if is_dir {
                    walker.skip_current_dir();
                }
                continue;
            }

            let included = self.include_matcher.is_match(&rel) || inside_expanded(&rel, &expanded);
            if !included {
                continue;
            }

            if is_dir {
                expanded.insert(rel);
            } else {
                matched.push(rel);
            }
        }

        matched.sort_by(|a, b| a.as_os_str().cmp(b.as_os_str()));
        Ok(matched)
    }
}

/// Default rule: every top-level entry except dotfiles.
pub fn default_rules() -> Vec<RuleConfig> {
    vec![RuleConfig {
        include: "*".to_string(),
        exclude: vec![".*".to_string()],
    }]
}

fn inside_expanded(rel: &Path, expanded: &HashSet<PathBuf>) -> bool {
    rel.ancestors()
        .skip(1)
        .take_while(|a| !a.as_os_str().is_empty())
        .any(|a| expanded.contains(a))
}

fn normalize_pattern(pattern: String) -> String {
    match pattern.strip_prefix("./") {
        Some(rest) => rest.to_string(),
        None => pattern,
    }
}

fn compile(pattern: &str) -> Result<globset::Glob> {
    if pattern.is_empty() {
        return Err(PackError::invalid_argument("glob pattern", "", "must not be empty"));
    }

    GlobBuilder::new(pattern)
        .literal_separator(true)
        .backslash_escape(true)
        .build()
        .map_err(|e| PackError::invalid_argument("glob pattern", pattern, &e.to_string()))
}

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::DirBuilderExt;

use rand::{distributions::Alphanumeric, Rng};
use serde::Serialize;
use tracing::{debug, info};

use crate::core::glob::GlobRule;
use crate::core::symlink::{absolutize, create_link};
use crate::error::{ErrorContext, PackError, Result};

/// How a staged entry was materialized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StagedKind {
    Link,
    Copy,
}

/// One entry of the staging directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedLink {
    pub link_path: PathBuf,
    pub target_path: PathBuf,
    pub relative: bool,
    pub kind: StagedKind,
}

/// Mirrors selected files of a source tree into a build directory as
/// symlinks, recreating intermediate directories as real directories.
#[derive(Debug, Clone)]
pub struct StagingBuilder {
    source_dir: PathBuf,
    build_dir: PathBuf,
    rules: Vec<GlobRule>,
    relative: bool,
    materialize: Vec<PathBuf>,
}

impl StagingBuilder {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(source_dir: P, build_dir: Q) -> Self {
        Self {
            source_dir: source_dir.as_ref().to_path_buf(),
            build_dir: build_dir.as_ref().to_path_buf(),
            rules: Vec::new(),
            relative: true,
            materialize: Vec::new(),
        }
    }

    /// Append a rule. Rules are applied in the order they were added.
    pub fn rule(mut self, rule: GlobRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(mut self, rules: impl IntoIterator<Item = GlobRule>) -> Self {
        self.rules.extend(rules);
        self
    }

    /// Store link targets relative to the link (default) or absolute.
    pub fn relative_links(mut self, relative: bool) -> Self {
        self.relative = relative;
        self
    }

    /// Stage `rel` as a real copy instead of a link, whether or not a rule
    /// selects it. Used for files that are rewritten after staging.
    pub fn materialize(mut self, rel: impl AsRef<Path>) -> Self {
        self.materialize.push(rel.as_ref().to_path_buf());
        self
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    /// Run every rule against the source tree and populate the build directory.
    ///
    /// When several rules select the same relative path the last one wins.
    /// On error the build directory is left as it is.
    pub fn stage(&self) -> Result<Vec<StagedLink>> {
        if !self.source_dir.is_dir() {
            return Err(PackError::invalid_argument(
                "source directory",
                self.source_dir.display(),
                "is not a directory",
            ));
        }

        let source = absolutize(&self.source_dir)?;
        let build = absolutize(&self.build_dir)?;
        create_private_dir(&build)?;

        let mut staged: Vec<StagedLink> = Vec::new();
        let mut index: HashMap<PathBuf, usize> = HashMap::new();

        for rule in &self.rules {
            let matched = rule.matches(&source)?;
            debug!(pattern = rule.include_pattern(), count = matched.len(), "rule matched");

            for rel in matched {
                let link_path = build.join(&rel);
                let target_path = source.join(&rel);

                if let Some(parent) = link_path.parent() {
                    create_private_dir(parent)?;
                }
                create_link(&link_path, &target_path, self.relative)?;

                record(
                    &mut staged,
                    &mut index,
                    rel,
                    StagedLink {
                        link_path,
                        target_path,
                        relative: self.relative,
                        kind: StagedKind::Link,
                    },
                );
            }
        }

        for rel in &self.materialize {
            let link_path = build.join(rel);
            let target_path = source.join(rel);
            copy_preserving(&target_path, &link_path)?;

            record(
                &mut staged,
                &mut index,
                rel.clone(),
                StagedLink {
                    link_path,
                    target_path,
                    relative: false,
                    kind: StagedKind::Copy,
                },
            );
        }

        info!(entries = staged.len(), build_dir = %build.display(), "staging complete");
        Ok(staged)
    }
}

/// Convenience wrapper around [`StagingBuilder`].
pub fn stage(source_dir: &Path, build_dir: &Path, rules: &[GlobRule]) -> Result<Vec<StagedLink>> {
    StagingBuilder::new(source_dir, build_dir)
        .rules(rules.iter().cloned())
        .stage()
}

/// Create a fresh, uniquely named build directory under `parent`
pub fn create_build_dir(parent: &Path, kind: &str) -> Result<PathBuf> {
    create_private_dir(parent)?;

    let rand: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();

    let dir = parent.join(format!("{}-{}", rand, kind));
    create_private_dir(&dir)?;
    Ok(dir)
}

/// `create_dir_all` with owner-only permissions for directories it creates
pub fn create_private_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }

    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);

    builder
        .create(dir)
        .with_io_context(|| format!("creating directory {}", dir.display()))
}

fn record(
    staged: &mut Vec<StagedLink>,
    index: &mut HashMap<PathBuf, usize>,
    rel: PathBuf,
    entry: StagedLink,
) {
    match index.get(&rel) {
        Some(&i) => {
            debug!(path = %rel.display(), "overriding earlier staged entry");
            staged[i] = entry;
        }
        None => {
            index.insert(rel, staged.len());
            staged.push(entry);
        }
    }
}

/// Copy `src` to `dst`, replacing a link at `dst`, and keep the mtime.
fn copy_preserving(src: &Path, dst: &Path) -> Result<()> {
    let meta = fs::metadata(src).with_io_context(|| format!("reading {}", src.display()))?;

    if let Some(parent) = dst.parent() {
        create_private_dir(parent)?;
    }
    if fs::symlink_metadata(dst).is_ok() {
        fs::remove_file(dst).with_io_context(|| format!("removing staged link {}", dst.display()))?;
    }

    fs::copy(src, dst)
        .with_io_context(|| format!("copying {} to {}", src.display(), dst.display()))?;

    if let Ok(modified) = meta.modified() {
        let file = fs::OpenOptions::new()
            .write(true)
            .open(dst)
            .with_io_context(|| format!("opening {}", dst.display()))?;
        file.set_modified(modified)
            .with_io_context(|| format!("setting modification time on {}", dst.display()))?;
    }

    debug!(path = %dst.display(), "materialized copy");
    Ok(())
}

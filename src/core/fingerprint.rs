//! File fingerprints and directory tree comparison.
//!
//! A fingerprint describes what a file looks like to someone who extracts the
//! archive: its name, its modification time truncated to whole seconds, its
//! permission bits, its size and a SHA-256 of its content. Symlinks are
//! always resolved first, so a link and its target fingerprint the same.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use walkdir::WalkDir;

use crate::core::hash::{hash_file, short_hash};
use crate::error::{ErrorContext, PackError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFingerprint {
    pub name: String,
    /// Seconds since the Unix epoch, sub-second part dropped
    pub modified: i64,
    pub mode: u32,
    pub size: u64,
    pub hash: String,
}

impl FileFingerprint {
    /// Names of the fields that differ from `other`
    pub fn differing_fields(&self, other: &FileFingerprint) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.name != other.name {
            fields.push("name");
        }
        if self.modified != other.modified {
            fields.push("mtime");
        }
        if self.mode != other.mode {
            fields.push("mode");
        }
        if self.size != other.size {
            fields.push("size");
        }
        if self.hash != other.hash {
            fields.push("hash");
        }
        fields
    }
}

/// A path that is not the same in both trees
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeMismatch {
    Differs {
        path: PathBuf,
        left: FileFingerprint,
        right: FileFingerprint,
    },
    OnlyInLeft {
        path: PathBuf,
    },
    OnlyInRight {
        path: PathBuf,
    },
}

impl TreeMismatch {
    pub fn path(&self) -> &Path {
        match self {
            TreeMismatch::Differs { path, .. }
            | TreeMismatch::OnlyInLeft { path }
            | TreeMismatch::OnlyInRight { path } => path,
        }
    }
}

impl fmt::Display for TreeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeMismatch::Differs { path, left, right } => write!(
                f,
                "{} differs ({}): {} vs {}",
                path.display(),
                left.differing_fields(right).join(", "),
                short_hash(&left.hash),
                short_hash(&right.hash)
            ),
            TreeMismatch::OnlyInLeft { path } => write!(f, "{} only in left tree", path.display()),
            TreeMismatch::OnlyInRight { path } => write!(f, "{} only in right tree", path.display()),
        }
    }
}

/// Fingerprint the file at `path`, following symlinks.
pub fn fingerprint(path: &Path) -> Result<FileFingerprint> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| PackError::invalid_argument("path", path.display(), "has no file name"))?;

    let resolved = fs::canonicalize(path)
        .with_io_context(|| format!("resolving {}", path.display()))?;
    let meta = fs::metadata(&resolved)
        .with_io_context(|| format!("reading metadata of {}", resolved.display()))?;
    if meta.is_dir() {
        return Err(PackError::invalid_argument("path", path.display(), "is a directory"));
    }

    let modified: DateTime<Utc> = meta
        .modified()
        .with_io_context(|| format!("reading modification time of {}", resolved.display()))?
        .into();

    Ok(FileFingerprint {
        name,
        modified: modified.timestamp(),
        mode: permission_bits(&meta),
        size: meta.len(),
        hash: hash_file(&resolved)?,
    })
}

/// Fingerprint every file below `dir`, keyed by relative path.
/// Directory entries are skipped; symlinks are followed.
pub fn tree_fingerprints(dir: &Path) -> Result<BTreeMap<PathBuf, FileFingerprint>> {
    if !dir.is_dir() {
        return Err(PackError::invalid_argument("directory", dir.display(), "is not a directory"));
    }

    let mut prints = BTreeMap::new();
    for entry in WalkDir::new(dir).min_depth(1).follow_links(true) {
        let entry = entry.with_io_context(|| format!("walking {}", dir.display()))?;
        if entry.file_type().is_dir() {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(dir)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| entry.path().to_path_buf());
        prints.insert(rel, fingerprint(entry.path())?);
    }
    Ok(prints)
}

/// Every path whose fingerprint differs, or that exists on one side only.
pub fn diff_trees(left: &Path, right: &Path) -> Result<Vec<TreeMismatch>> {
    let left_prints = tree_fingerprints(left)?;
    let right_prints = tree_fingerprints(right)?;

    let paths: BTreeSet<&PathBuf> = left_prints.keys().chain(right_prints.keys()).collect();
    let mut mismatches = Vec::new();

    for path in paths {
        match (left_prints.get(path), right_prints.get(path)) {
            (Some(l), Some(r)) if l != r => mismatches.push(TreeMismatch::Differs {
                path: path.clone(),
                left: l.clone(),
                right: r.clone(),
            }),
            (Some(_), None) => mismatches.push(TreeMismatch::OnlyInLeft { path: path.clone() }),
            (None, Some(_)) => mismatches.push(TreeMismatch::OnlyInRight { path: path.clone() }),
            _ => {}
        }
    }
    Ok(mismatches)
}

/// Fail with `MismatchError` unless both trees hold identical files.
pub fn compare_trees(left: &Path, right: &Path) -> Result<()> {
    let mismatches = diff_trees(left, right)?;
    if mismatches.is_empty() {
        Ok(())
    } else {
        Err(PackError::Mismatch { mismatches })
    }
}

#[cfg(unix)]
pub fn permission_bits(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
pub fn permission_bits(meta: &fs::Metadata) -> u32 {
    if meta.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};
    use tempfile::tempdir;

    fn write_with_time(path: &Path, content: &str, time: SystemTime) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(0o644)).unwrap();
        let file = fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(time).unwrap();
    }

    fn base_time() -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    #[test]
    fn test_subsecond_jitter_is_ignored() {
        let tmp = tempdir().unwrap();
        let a = tmp.path().join("a/script.sh");
        let b = tmp.path().join("b/script.sh");
        write_with_time(&a, "echo", base_time() + Duration::from_millis(100));
        write_with_time(&b, "echo", base_time() + Duration::from_millis(500));

        assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
    }

    #[test]
    fn test_fields_are_compared() {
        let tmp = tempdir().unwrap();
        let a = tmp.path().join("a/file.txt");
        let b = tmp.path().join("b/file.txt");
        write_with_time(&a, "one", base_time());
        write_with_time(&b, "two", base_time() + Duration::from_secs(1));
        fs::set_permissions(&b, fs::Permissions::from_mode(0o755)).unwrap();

        let fa = fingerprint(&a).unwrap();
        let fb = fingerprint(&b).unwrap();
        assert_eq!(fa.differing_fields(&fb), vec!["mtime", "mode", "hash"]);
        assert_eq!(fb.mode, 0o755);
    }

    #[test]
    fn test_link_fingerprint_describes_target() {
        let tmp = tempdir().unwrap();
        let target = tmp.path().join("real/icon.png");
        write_with_time(&target, "png", base_time());
        let link = tmp.path().join("staged/icon.png");
        fs::create_dir_all(link.parent().unwrap()).unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();

        assert_eq!(fingerprint(&link).unwrap(), fingerprint(&target).unwrap());
    }

    #[test]
    fn test_compare_trees_lists_all_mismatches() {
        let tmp = tempdir().unwrap();
        let left = tmp.path().join("left");
        let right = tmp.path().join("right");
        write_with_time(&left.join("same.txt"), "same", base_time());
        write_with_time(&right.join("same.txt"), "same", base_time());
        write_with_time(&left.join("changed.txt"), "a", base_time());
        write_with_time(&right.join("changed.txt"), "b", base_time());
        write_with_time(&left.join("only-left/x.txt"), "x", base_time());
        write_with_time(&right.join("only-right.txt"), "y", base_time());

        let err = compare_trees(&left, &right).unwrap_err();
        let PackError::Mismatch { mismatches } = err else {
            panic!("expected mismatch error");
        };
        let paths: Vec<_> = mismatches.iter().map(|m| m.path().to_path_buf()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("changed.txt"),
                PathBuf::from("only-left/x.txt"),
                PathBuf::from("only-right.txt"),
            ]
        );
        assert!(matches!(mismatches[1], TreeMismatch::OnlyInLeft { .. }));
        assert!(matches!(mismatches[2], TreeMismatch::OnlyInRight { .. }));
    }

    #[test]
    fn test_identical_trees() {
        let tmp = tempdir().unwrap();
        let left = tmp.path().join("left");
        let right = tmp.path().join("right");
        for root in [&left, &right] {
            write_with_time(&root.join("a/b/c.txt"), "deep", base_time());
            write_with_time(&root.join("top.txt"), "top", base_time());
        }
        fs::create_dir_all(right.join("empty-dir")).unwrap();

        compare_trees(&left, &right).unwrap();
    }

    #[test]
    fn test_broken_link_is_io_error() {
        let tmp = tempdir().unwrap();
        let link = tmp.path().join("dangling");
        std::os::unix::fs::symlink(tmp.path().join("missing"), &link).unwrap();

        assert_eq!(fingerprint(&link).unwrap_err().kind(), "IOError");
    }
}

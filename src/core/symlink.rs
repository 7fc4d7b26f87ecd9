use std::fs;
use std::path::{Component, Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs as unix_fs;

use rand::{distributions::Alphanumeric, Rng};
use tracing::debug;

use crate::error::{ErrorContext, PackError, Result};

/// Create or replace the symlink at `link` so that it points at `target`.
///
/// `target` is resolved against the working directory first. With `relative`
/// set, the stored link text is the path from the link's parent directory to
/// the target; otherwise the absolute path is stored. Whatever already exists
/// at `link` is replaced. Files and links are swapped in with a rename so the
/// path never disappears; a real directory has to be removed first.
///
/// The target does not have to exist. The parent directory of `link` does.
pub fn create_link(link: impl AsRef<Path>, target: impl AsRef<Path>, relative: bool) -> Result<()> {
    let link = link.as_ref();
    let target = target.as_ref();

    if link.as_os_str().is_empty() {
        return Err(PackError::invalid_argument("link path", "", "must not be empty"));
    }
    if target.as_os_str().is_empty() {
        return Err(PackError::invalid_argument("link target", "", "must not be empty"));
    }

    let abs_target = absolutize(target)?;
    let abs_link = absolutize(link)?;
    let stored = if relative {
        let parent = abs_link.parent().unwrap_or_else(|| Path::new("/"));
        relative_path(parent, &abs_target)
    } else {
        abs_target
    };

    if let Ok(meta) = fs::symlink_metadata(&abs_link) {
        if meta.is_dir() {
            fs::remove_dir_all(&abs_link)
                .with_io_context(|| format!("removing existing directory {}", abs_link.display()))?;
        }
    }

    let staging = temporary_sibling(&abs_link)?;
    symlink(&stored, &staging)
        .with_io_context(|| format!("creating symlink {} -> {}", link.display(), stored.display()))?;

    if let Err(e) = fs::rename(&staging, &abs_link) {
        let _ = fs::remove_file(&staging);
        return Err(PackError::Io {
            source: e,
            context: format!("replacing {}", link.display()),
        });
    }

    debug!(link = %abs_link.display(), target = %stored.display(), "linked");
    Ok(())
}

/// Make `path` absolute against the working directory and clean `.`/`..`
/// components lexically, without touching the filesystem.
pub fn absolutize(path: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .with_io_context(|| "reading working directory".to_string())?
            .join(path)
    };

    let mut clean = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                clean.pop();
            }
            other => clean.push(other.as_os_str()),
        }
    }
    Ok(clean)
}

/// Path from directory `from` to `to`. Both must be absolute and clean.
pub fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component<'_>> = from.components().collect();
    let to: Vec<Component<'_>> = to.components().collect();

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..from.len() {
        rel.push("..");
    }
    for component in &to[common..] {
        rel.push(component.as_os_str());
    }

    if rel.as_os_str().is_empty() {
        rel.push(".");
    }
    rel
}

fn temporary_sibling(link: &Path) -> Result<PathBuf> {
    let name = link.file_name().ok_or_else(|| {
        PackError::invalid_argument("link path", link.display(), "has no file name")
    })?;
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();

    let mut tmp_name = std::ffi::OsString::from(".");
    tmp_name.push(name);
    tmp_name.push(format!(".{}.tmp", suffix));
    Ok(link.with_file_name(tmp_name))
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    unix_fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    let resolved = link.parent().map(|p| p.join(target)).unwrap_or_else(|| target.to_path_buf());
    if resolved.is_dir() {
        std::os::windows::fs::symlink_dir(target, link)
    } else {
        std::os::windows::fs::symlink_file(target, link)
    }
}

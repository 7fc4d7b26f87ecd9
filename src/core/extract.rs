use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::NaiveDate;
use tracing::{debug, info};
use zip::read::ZipFile;
use zip::{DateTime as ZipDateTime, ExtraField, ZipArchive};

use crate::core::export::archive_error;
use crate::error::{ErrorContext, PackError, Result};

/// Unpack `archive` into `dest`, restoring permission bits and modification
/// times. Returns the paths of the extracted files.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    let file = fs::File::open(archive)
        .with_io_context(|| format!("opening archive {}", archive.display()))?;
    let mut zip = ZipArchive::new(file).map_err(|e| archive_error(archive, e))?;

    fs::create_dir_all(dest)
        .with_io_context(|| format!("creating directory {}", dest.display()))?;

    let mut extracted = Vec::new();
    for idx in 0..zip.len() {
        let mut entry = zip.by_index(idx).map_err(|e| archive_error(archive, e))?;
        let rel = entry.enclosed_name().ok_or_else(|| {
            PackError::invalid_argument("archive entry", entry.name(), "escapes the destination directory")
        })?;
        let out = dest.join(&rel);

        if entry.is_dir() {
            fs::create_dir_all(&out)
                .with_io_context(|| format!("creating directory {}", out.display()))?;
            continue;
        }

        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)
                .with_io_context(|| format!("creating directory {}", parent.display()))?;
        }

        let mut target = fs::File::create(&out)
            .with_io_context(|| format!("creating {}", out.display()))?;
        io::copy(&mut entry, &mut target)
            .with_io_context(|| format!("extracting {}", out.display()))?;

        if let Some(modified) = entry_mtime(&entry) {
            target
                .set_modified(modified)
                .with_io_context(|| format!("setting modification time of {}", out.display()))?;
        }
        drop(target);

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out, fs::Permissions::from_mode(mode & 0o7777))
                .with_io_context(|| format!("setting permissions of {}", out.display()))?;
        }

        debug!(entry = %rel.display(), "extracted");
        extracted.push(out);
    }

    info!(archive = %archive.display(), files = extracted.len(), "archive extracted");
    Ok(extracted)
}

/// Whole-second mtime from the extended timestamp field, else the DOS time
fn entry_mtime<R: io::Read>(entry: &ZipFile<'_, R>) -> Option<SystemTime> {
    let extended = entry.extra_data_fields().find_map(|field| match field {
        ExtraField::ExtendedTimestamp(ts) => ts.mod_time(),
        _ => None,
    });
    match extended {
        Some(secs) => Some(UNIX_EPOCH + Duration::from_secs(u64::from(secs))),
        None => entry.last_modified().and_then(system_time),
    }
}

/// Archive timestamps are written in UTC
fn system_time(stamp: ZipDateTime) -> Option<SystemTime> {
    let utc = NaiveDate::from_ymd_opt(stamp.year() as i32, stamp.month() as u32, stamp.day() as u32)?
        .and_hms_opt(stamp.hour() as u32, stamp.minute() as u32, stamp.second() as u32)?
        .and_utc();
    Some(utc.into())
}

//! Writes a staging directory out as a zip archive.
//!
//! Links in the staging directory are dereferenced: each entry carries the
//! content, permission bits and modification time of the file it points at,
//! stored under the link's own relative path. The archive never contains a
//! symlink entry.
//!
//! Besides the 2-second DOS timestamp every entry carries an extended
//! timestamp field with the mtime in whole UTC seconds.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::write::FullFileOptions;
use zip::{CompressionMethod, DateTime as ZipDateTime, ZipWriter};

use crate::core::fingerprint::permission_bits;
use crate::core::symlink::absolutize;
use crate::error::{ErrorContext, PackError, Result};
use crate::manifest::{WorkflowManifest, DEFAULT_MANIFEST};

pub const DEFAULT_EXTENSION: &str = "wfpkg";

/// Earliest and latest instants a DOS timestamp can hold
const ZIP_MIN_YEAR: i32 = 1980;
const ZIP_MAX_YEAR: i32 = 2107;

/// Extended timestamp extra field (`UT`)
pub const EXTENDED_TIMESTAMP_ID: u16 = 0x5455;
/// Flag bit: the field carries a modification time
const EXTENDED_TIMESTAMP_MTIME: u8 = 0b001;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Stored,
    #[default]
    Deflated,
}

impl Compression {
    fn method(self) -> CompressionMethod {
        match self {
            Compression::Stored => CompressionMethod::Stored,
            Compression::Deflated => CompressionMethod::Deflated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    /// Manifest path, relative to the staging directory
    pub manifest: PathBuf,
    /// Archive file extension, without the dot
    pub extension: String,
    pub compression: Compression,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            manifest: PathBuf::from(DEFAULT_MANIFEST),
            extension: DEFAULT_EXTENSION.to_string(),
            compression: Compression::default(),
        }
    }
}

#[derive(Default)]
pub struct ArchiveExporter {
    options: ExportOptions,
    progress: Option<ProgressBar>,
}

/// A file or directory queued for the archive
struct ArchiveEntry {
    rel: PathBuf,
    source: PathBuf,
    is_dir: bool,
}

impl ArchiveExporter {
    pub fn new(options: ExportOptions) -> Self {
        Self {
            options,
            progress: None,
        }
    }

    /// Report one tick per written entry on `pb`
    pub fn with_progress(mut self, pb: ProgressBar) -> Self {
        self.progress = Some(pb);
        self
    }

    /// File name the archive for `staging` will get
    pub fn archive_name(&self, staging: &Path) -> Result<String> {
        let manifest = WorkflowManifest::load(staging.join(&self.options.manifest))?;
        let stem = manifest.archive_stem()?;
        if self.options.extension.is_empty() {
            Ok(stem)
        } else {
            Ok(format!("{}.{}", stem, self.options.extension))
        }
    }

    /// Export `staging` to `<output>/<name>-<version>.<extension>` and
    /// return the archive's absolute path.
    pub fn export(&self, staging: &Path, output: &Path) -> Result<PathBuf> {
        if !staging.is_dir() {
            return Err(PackError::invalid_argument(
                "staging directory",
                staging.display(),
                "is not a directory",
            ));
        }

        let name = self.archive_name(staging)?;
        fs::create_dir_all(output)
            .with_io_context(|| format!("creating output directory {}", output.display()))?;
        let archive = absolutize(&output.join(&name))?;
        let partial = archive.with_file_name(format!(".{}.partial", name));

        let entries = collect_entries(staging)?;
        if let Some(pb) = &self.progress {
            pb.set_length(entries.len() as u64);
        }

        let written = self.write_archive(&partial, &entries);
        if let Err(e) = written {
            let _ = fs::remove_file(&partial);
            return Err(e);
        }

        fs::rename(&partial, &archive)
            .with_io_context(|| format!("moving archive into place at {}", archive.display()))?;

        if let Some(pb) = &self.progress {
            pb.finish_and_clear();
        }
        info!(archive = %archive.display(), entries = entries.len(), "archive exported");
        Ok(archive)
    }

    fn write_archive(&self, path: &Path, entries: &[ArchiveEntry]) -> Result<()> {
        let file = fs::File::create(path)
            .with_io_context(|| format!("creating archive {}", path.display()))?;
        let mut zip = ZipWriter::new(file);

        for entry in entries {
            let meta = fs::metadata(&entry.source)
                .with_io_context(|| format!("reading metadata of {}", entry.source.display()))?;
            let modified = meta
                .modified()
                .with_io_context(|| format!("reading modification time of {}", entry.source.display()))?;
            let mut options = FullFileOptions::default()
                .compression_method(self.options.compression.method())
                .unix_permissions(permission_bits(&meta))
                .last_modified_time(zip_timestamp(modified, path)?);
            if let Some(field) = extended_timestamp(modified) {
                options
                    .add_extra_data(EXTENDED_TIMESTAMP_ID, field, false)
                    .map_err(|e| archive_error(path, e))?;
            }
            let name = entry_name(&entry.rel);

            if entry.is_dir {
                zip.add_directory(format!("{}/", name), options)
                    .map_err(|e| archive_error(path, e))?;
            } else {
                let mut source = fs::File::open(&entry.source)
                    .with_io_context(|| format!("opening {} for archiving", entry.source.display()))?;
                zip.start_file(name.clone(), options)
                    .map_err(|e| archive_error(path, e))?;
                io::copy(&mut source, &mut zip)
                    .with_io_context(|| format!("writing {} into archive", name))?;
            }
            debug!(entry = %name, dir = entry.is_dir, "archived");

            if let Some(pb) = &self.progress {
                pb.set_message(name);
                pb.inc(1);
            }
        }

        zip.finish().map_err(|e| archive_error(path, e))?;
        Ok(())
    }
}

/// Every entry below `staging`, links followed, in byte-wise path order
fn collect_entries(staging: &Path) -> Result<Vec<ArchiveEntry>> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(staging).min_depth(1).follow_links(true) {
        let entry = entry.with_io_context(|| format!("walking {}", staging.display()))?;
        let rel = entry
            .path()
            .strip_prefix(staging)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| entry.path().to_path_buf());

        entries.push(ArchiveEntry {
            rel,
            source: entry.path().to_path_buf(),
            is_dir: entry.file_type().is_dir(),
        });
    }

    entries.sort_by(|a, b| a.rel.as_os_str().cmp(b.rel.as_os_str()));
    Ok(entries)
}

/// Relative path with `/` separators, as stored in the archive
fn entry_name(rel: &Path) -> String {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// DOS timestamp for `time` in UTC, clamped to the range the format can hold
pub fn zip_timestamp(time: SystemTime, archive: &Path) -> Result<ZipDateTime> {
    let mut utc: DateTime<Utc> = time.into();

    if utc.year() < ZIP_MIN_YEAR {
        utc = NaiveDate::from_ymd_opt(ZIP_MIN_YEAR, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
            .unwrap_or(utc);
    } else if utc.year() > ZIP_MAX_YEAR {
        utc = NaiveDate::from_ymd_opt(ZIP_MAX_YEAR, 12, 31)
            .and_then(|d| d.and_hms_opt(23, 59, 58))
            .map(|dt| dt.and_utc())
            .unwrap_or(utc);
    }

    ZipDateTime::from_date_and_time(
        utc.year() as u16,
        utc.month() as u8,
        utc.day() as u8,
        utc.hour() as u8,
        utc.minute() as u8,
        utc.second() as u8,
    )
    .map_err(|e| PackError::Archive {
        path: archive.to_path_buf(),
        reason: format!("timestamp {} out of range: {}", utc, e),
    })
}

/// Payload of an extended timestamp field holding only the mtime.
/// `None` when the time does not fit the field's unsigned 32-bit seconds.
fn extended_timestamp(time: SystemTime) -> Option<Box<[u8]>> {
    let secs = time.duration_since(UNIX_EPOCH).ok()?.as_secs();
    let secs = u32::try_from(secs).ok()?;

    let mut field = Vec::with_capacity(5);
    field.push(EXTENDED_TIMESTAMP_MTIME);
    field.extend_from_slice(&secs.to_le_bytes());
    Some(field.into_boxed_slice())
}

pub(crate) fn archive_error(path: &Path, err: zip::result::ZipError) -> PackError {
    PackError::Archive {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

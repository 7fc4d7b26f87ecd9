use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{ErrorContext, PackError, Result};
use crate::manifest::WorkflowManifest;

/// Outcome of sanitizing a staged manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SanitizeReport {
    /// Variables whose value was replaced with an empty string
    pub cleared: Vec<String>,
    /// Whether the file was rewritten
    pub rewritten: bool,
}

/// Blank every non-exportable variable in the staged manifest at `path`.
///
/// The manifest must be a regular file: a symlink would point back into the
/// source tree. When nothing needs clearing the file is not rewritten, so its
/// bytes and mtime stay identical to the source.
pub fn sanitize(path: &Path) -> Result<SanitizeReport> {
    let meta = fs::symlink_metadata(path)
        .with_io_context(|| format!("reading staged manifest {}", path.display()))?;
    if !meta.file_type().is_file() {
        return Err(PackError::invalid_argument(
            "staged manifest",
            path.display(),
            "must be a regular file, not a link or directory",
        ));
    }

    let mut manifest = WorkflowManifest::load(path)?;
    let mut report = SanitizeReport::default();

    for variable in manifest.variables()? {
        if variable.is_exportable() {
            continue;
        }
        if !variable.value.is_empty() {
            manifest.clear_value(&variable.name)?;
            report.cleared.push(variable.name.clone());
        }
        debug!(variable = %variable.name, "variable not exported");
    }

    if !report.cleared.is_empty() {
        manifest.save()?;
        report.rewritten = true;
    }

    info!(cleared = report.cleared.len(), manifest = %path.display(), "manifest sanitized");
    Ok(report)
}

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::cli::ui::{highlight, print_success, print_text_diff};
use crate::core::extract::extract_archive;
use crate::core::fingerprint::{diff_trees, TreeMismatch};
use crate::core::staging::create_build_dir;
use crate::error::{PackError, Result};

/// Handle `wfpack verify`. When `right` is a file it is treated as an
/// archive and extracted to a scratch directory first.
pub fn handle_verify(left: &Path, right: &Path) -> Result<()> {
    if !right.is_file() {
        return report_differences(left, right);
    }

    let scratch = create_build_dir(&std::env::temp_dir(), "verify")?;
    let result = extract_archive(right, &scratch).and_then(|_| report_differences(left, &scratch));
    if let Err(e) = fs::remove_dir_all(&scratch) {
        debug!(dir = %scratch.display(), error = %e, "could not remove scratch directory");
    }
    result
}

fn report_differences(left: &Path, right: &Path) -> Result<()> {
    let mismatches = diff_trees(left, right)?;

    if mismatches.is_empty() {
        print_success(&format!(
            "{} and {} hold identical files",
            highlight(&left.display().to_string()),
            highlight(&right.display().to_string())
        ));
        return Ok(());
    }

    for mismatch in &mismatches {
        if let TreeMismatch::Differs { path, left: l, right: r } = mismatch {
            if l.hash == r.hash {
                continue;
            }
            let texts = (
                fs::read_to_string(left.join(path)),
                fs::read_to_string(right.join(path)),
            );
            if let (Ok(a), Ok(b)) = texts {
                print_text_diff(&path.display().to_string(), &a, &b);
            }
        }
    }
    Err(PackError::Mismatch { mismatches })
}

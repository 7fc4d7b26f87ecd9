use std::path::Path;

use crate::cli::handlers::command_rules;
use crate::cli::ui::{dim, highlight, print_success};
use crate::config::PackConfig;
use crate::core::staging::{StagedKind, StagingBuilder};
use crate::core::symlink::absolutize;
use crate::error::Result;
use crate::manifest::sanitize;

/// Handle `wfpack stage`: stage and sanitize, but do not export
pub fn handle_stage(
    config: &PackConfig,
    source: &Path,
    build_dir: &Path,
    include: &[String],
    exclude: &[String],
    absolute: bool,
) -> Result<()> {
    let manifest = &config.package.manifest;
    let staged = StagingBuilder::new(source, build_dir)
        .rules(command_rules(config, include, exclude)?)
        .relative_links(!absolute)
        .materialize(manifest)
        .stage()?;
    let report = sanitize(&build_dir.join(manifest))?;

    let build_abs = absolutize(build_dir)?;
    for entry in &staged {
        let rel = entry.link_path.strip_prefix(&build_abs).unwrap_or(&entry.link_path);
        match entry.kind {
            StagedKind::Link => println!("{} -> {}", rel.display(), dim(&entry.target_path.display().to_string())),
            StagedKind::Copy => println!("{} {}", rel.display(), dim("(copy)")),
        }
    }
    print_success(&format!(
        "Staged {} entries into {} ({} variables cleared)",
        staged.len(),
        highlight(&build_dir.display().to_string()),
        report.cleared.len()
    ));
    Ok(())
}

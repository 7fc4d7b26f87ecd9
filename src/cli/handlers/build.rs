use std::path::{Path, PathBuf};

use crate::cli::handlers::command_rules;
use crate::cli::ui::{create_progress_bar, dim, highlight, print_info, print_success, print_warning};
use crate::core::staging::StagedKind;
use crate::config::PackConfig;
use crate::error::Result;
use crate::pipeline::{BuildOptions, Pipeline};

/// Arguments of `wfpack build`
#[derive(Debug, Clone, Default)]
pub struct BuildArgs {
    pub source: PathBuf,
    pub output: Option<PathBuf>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub absolute: bool,
    pub extension: Option<String>,
    pub build_dir: Option<PathBuf>,
    pub keep_build_dir: bool,
    pub verify: bool,
}

/// Handle archive builds
pub fn handle_build(config: &PackConfig, args: BuildArgs) -> Result<()> {
    let mut options = BuildOptions::from_config(&args.source, config)?;
    options.rules = command_rules(config, &args.include, &args.exclude)?;
    if let Some(output) = args.output {
        options.output_dir = output;
    }
    if let Some(extension) = args.extension {
        options.export.extension = extension;
    }
    if args.absolute {
        options.relative_links = false;
    }
    options.build_root = args.build_dir;
    options.keep_build_dir = args.keep_build_dir;
    options.verify = args.verify;

    let pb = create_progress_bar(&format!("Packaging {}", args.source.display()));
    let result = Pipeline::new(options).with_progress(pb.clone()).run();
    pb.finish_and_clear();
    let report = result?;

    if report.staged.iter().all(|entry| entry.kind == StagedKind::Copy) {
        print_warning("No files matched the staging rules; the archive only holds the manifest");
    }

    let archive_name = file_name(&report.archive);
    print_success(&format!(
        "Built {} {}",
        highlight(&archive_name),
        dim(&format!("({} staged, {} cleared)", report.staged.len(), report.sanitized.cleared.len()))
    ));
    for name in &report.sanitized.cleared {
        print_info(&format!("Cleared non-exportable variable {}", highlight(name)));
    }
    if report.verified {
        print_info("Archive verified against staged tree");
    }
    if let Some(dir) = &report.build_dir {
        print_info(&format!("Build directory kept at {}", dir.display()));
    }
    println!("{}", report.archive.display());
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

//! Stage, sanitize, export and optionally verify, in that order.

use std::fs;
use std::path::{Path, PathBuf};

use indicatif::ProgressBar;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::PackConfig;
use crate::core::export::{ArchiveExporter, ExportOptions};
use crate::core::extract::extract_archive;
use crate::core::fingerprint::compare_trees;
use crate::core::glob::{default_rules, GlobRule};
use crate::core::staging::{create_build_dir, StagedLink, StagingBuilder};
use crate::core::symlink::absolutize;
use crate::error::{PackError, Result};
use crate::manifest::{sanitize, SanitizeReport, WorkflowManifest};

/// Everything a build needs
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Staging rules; empty means the default rule set
    pub rules: Vec<GlobRule>,
    pub export: ExportOptions,
    pub relative_links: bool,
    /// Parent of the build directory; the system temp dir when `None`
    pub build_root: Option<PathBuf>,
    pub keep_build_dir: bool,
    pub verify: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("."),
            output_dir: PathBuf::from("dist"),
            rules: Vec::new(),
            export: ExportOptions::default(),
            relative_links: true,
            build_root: None,
            keep_build_dir: false,
            verify: false,
        }
    }
}

impl BuildOptions {
    /// Options for building `source_dir` as described by `config`
    pub fn from_config(source_dir: &Path, config: &PackConfig) -> Result<Self> {
        Ok(Self {
            source_dir: source_dir.to_path_buf(),
            output_dir: config.output_dir(source_dir),
            rules: config.glob_rules()?,
            export: config.export_options(),
            relative_links: config.package.relative_links,
            ..Self::default()
        })
    }
}

/// What a build produced
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub archive: PathBuf,
    pub staged: Vec<StagedLink>,
    pub sanitized: SanitizeReport,
    pub verified: bool,
    /// Set when the build directory was kept
    pub build_dir: Option<PathBuf>,
}

pub struct Pipeline {
    options: BuildOptions,
    progress: Option<ProgressBar>,
}

impl Pipeline {
    pub fn new(options: BuildOptions) -> Self {
        Self {
            options,
            progress: None,
        }
    }

    pub fn with_progress(mut self, pb: ProgressBar) -> Self {
        self.progress = Some(pb);
        self
    }

    /// Run the build. The build directory is removed afterwards, whether the
    /// build succeeded or not, unless `keep_build_dir` is set.
    pub fn run(self) -> Result<BuildReport> {
        let opts = &self.options;
        if !opts.source_dir.is_dir() {
            return Err(PackError::invalid_argument(
                "source directory",
                opts.source_dir.display(),
                "is not a directory",
            ));
        }

        let source = absolutize(&opts.source_dir)?;
        let output = absolutize(&opts.output_dir)?;
        let build_root = match &opts.build_root {
            Some(root) => absolutize(root)?,
            None => std::env::temp_dir(),
        };
        let rules = self.effective_rules(&source, &output, &build_root)?;

        let build_dir = create_build_dir(&build_root, "stage")?;
        let verify_dir = sibling(&build_dir, "verify");
        debug!(build_dir = %build_dir.display(), "build directory created");

        let result = self.run_stages(&source, &output, &build_dir, &verify_dir, rules);

        if opts.keep_build_dir {
            info!(build_dir = %build_dir.display(), "keeping build directory");
        } else {
            remove_dir(&build_dir);
            remove_dir(&verify_dir);
        }

        let mut report = result?;
        if opts.keep_build_dir {
            report.build_dir = Some(build_dir);
        }
        Ok(report)
    }

    fn run_stages(
        &self,
        source: &Path,
        output: &Path,
        build_dir: &Path,
        verify_dir: &Path,
        rules: Vec<GlobRule>,
    ) -> Result<BuildReport> {
        let opts = &self.options;
        let manifest_rel = &opts.export.manifest;

        let staged = StagingBuilder::new(source, build_dir)
            .rules(rules)
            .relative_links(opts.relative_links)
            .materialize(manifest_rel)
            .stage()?;

        let sanitized = sanitize(&build_dir.join(manifest_rel))?;

        let mut exporter = ArchiveExporter::new(opts.export.clone());
        if let Some(pb) = &self.progress {
            exporter = exporter.with_progress(pb.clone());
        }
        let archive = exporter.export(build_dir, output)?;

        if opts.verify {
            verify_archive(&archive, build_dir, verify_dir, manifest_rel)?;
        }

        info!(archive = %archive.display(), staged = staged.len(), "build complete");
        Ok(BuildReport {
            archive,
            staged,
            sanitized,
            verified: opts.verify,
            build_dir: None,
        })
    }

    /// Configured rules, with the output directory and build root excluded
    /// when they lie inside the source tree.
    fn effective_rules(&self, source: &Path, output: &Path, build_root: &Path) -> Result<Vec<GlobRule>> {
        let mut rules = if self.options.rules.is_empty() {
            default_rules()
                .iter()
                .map(GlobRule::from_config)
                .collect::<Result<Vec<_>>>()?
        } else {
            self.options.rules.clone()
        };

        for (field, dir) in [("output directory", output), ("build directory root", build_root)] {
            let Ok(rel) = dir.strip_prefix(source) else {
                continue;
            };
            if rel.as_os_str().is_empty() {
                return Err(PackError::invalid_argument(
                    field,
                    dir.display(),
                    "must not be the source directory itself",
                ));
            }
            let pattern = glob_literal(rel);
            debug!(pattern = %pattern, "excluding generated directory");
            rules = rules
                .iter()
                .map(|rule| rule.excluding(pattern.clone()))
                .collect::<Result<Vec<_>>>()?;
        }
        Ok(rules)
    }
}

/// Extract `archive` and check it holds exactly what was staged, with every
/// non-exportable variable blank in the packaged manifest.
fn verify_archive(archive: &Path, build_dir: &Path, verify_dir: &Path, manifest_rel: &Path) -> Result<()> {
    extract_archive(archive, verify_dir)?;

    compare_trees(build_dir, verify_dir)?;

    let packaged = WorkflowManifest::load(verify_dir.join(manifest_rel))?;
    for variable in packaged.variables()? {
        if !variable.is_exportable() && !variable.value.is_empty() {
            return Err(PackError::manifest(
                &variable.name,
                "is not exportable but has a value in the archive",
            ));
        }
    }

    info!(archive = %archive.display(), "archive verified");
    Ok(())
}

/// Relative path as a glob matching exactly that path
fn glob_literal(rel: &Path) -> String {
    let text = rel.to_string_lossy().replace('\\', "/");
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '{' | '}' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn sibling(dir: &Path, suffix: &str) -> PathBuf {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dir.with_file_name(format!("{}-{}", name, suffix))
}

fn remove_dir(dir: &Path) {
    if !dir.exists() {
        return;
    }
    match fs::remove_dir_all(dir) {
        Ok(()) => debug!(dir = %dir.display(), "removed"),
        Err(e) => warn!(dir = %dir.display(), error = %e, "could not remove build directory"),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::tempdir;

    fn source_tree(root: &Path) -> PathBuf {
        let src = root.join("src");
        fs::create_dir_all(src.join("icons")).unwrap();
        fs::write(
            src.join("workflow.toml"),
            "name = \"Demo\"\nversion = \"1.2.0\"\n\n[variables]\nTOKEN = { value = \"secret\", export = false }\nOPEN = \"o\"\n",
        )
        .unwrap();
        fs::write(src.join("main.py"), "print('hi')").unwrap();
        fs::write(src.join("icons/icon.png"), "png").unwrap();
        fs::write(src.join(".hidden"), "x").unwrap();
        src
    }

    #[test]
    fn test_build_with_verify_cleans_up() {
        let tmp = tempdir().unwrap();
        let src = source_tree(tmp.path());
        let build_root = tmp.path().join("builds");

        let report = Pipeline::new(BuildOptions {
            source_dir: src.clone(),
            output_dir: tmp.path().join("dist"),
            build_root: Some(build_root.clone()),
            verify: true,
            ..BuildOptions::default()
        })
        .run()
        .unwrap();

        assert_eq!(report.archive, tmp.path().join("dist/Demo-1.2.0.wfpkg"));
        assert!(report.verified);
        assert_eq!(report.sanitized.cleared, vec!["TOKEN"]);
        assert!(report.build_dir.is_none());
        assert_eq!(fs::read_dir(&build_root).unwrap().count(), 0);

        // the source manifest is never written
        let source_manifest = WorkflowManifest::load(src.join("workflow.toml")).unwrap();
        assert_eq!(source_manifest.variable("TOKEN").unwrap().unwrap().value, "secret");
    }

    #[test]
    fn test_output_inside_source_is_not_packaged() {
        let tmp = tempdir().unwrap();
        let src = source_tree(tmp.path());
        let options = BuildOptions {
            source_dir: src.clone(),
            output_dir: src.join("dist"),
            build_root: Some(src.join("build")),
            ..BuildOptions::default()
        };

        Pipeline::new(options.clone()).run().unwrap();
        let report = Pipeline::new(options).run().unwrap();

        let staged: Vec<_> = report
            .staged
            .iter()
            .map(|s| s.link_path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert!(!staged.iter().any(|name| name.ends_with(".wfpkg")));
        assert!(!report.staged.iter().any(|s| s.target_path.starts_with(src.join("build"))));
    }

    #[test]
    fn test_keep_build_dir() {
        let tmp = tempdir().unwrap();
        let src = source_tree(tmp.path());

        let report = Pipeline::new(BuildOptions {
            source_dir: src,
            output_dir: tmp.path().join("dist"),
            build_root: Some(tmp.path().join("builds")),
            keep_build_dir: true,
            ..BuildOptions::default()
        })
        .run()
        .unwrap();

        let build_dir = report.build_dir.unwrap();
        assert!(build_dir.join("main.py").is_symlink());
        assert!(!build_dir.join("workflow.toml").is_symlink());
        assert!(!build_dir.join(".hidden").exists());
    }

    #[test]
    fn test_failure_removes_build_dir() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("workflow.toml"), "version = \"1\"\n").unwrap();
        let build_root = tmp.path().join("builds");

        let err = Pipeline::new(BuildOptions {
            source_dir: src,
            output_dir: tmp.path().join("dist"),
            build_root: Some(build_root.clone()),
            ..BuildOptions::default()
        })
        .run()
        .unwrap_err();

        assert_eq!(err.kind(), "ManifestError");
        assert_eq!(fs::read_dir(&build_root).unwrap().count(), 0);
        assert!(!tmp.path().join("dist").exists());
    }

    #[test]
    fn test_verify_with_odd_second_mtimes() {
        let tmp = tempdir().unwrap();
        let src = source_tree(tmp.path());
        let odd = UNIX_EPOCH + Duration::from_secs(1_700_000_001);
        for file in ["main.py", "icons/icon.png", "workflow.toml"] {
            fs::OpenOptions::new()
                .write(true)
                .open(src.join(file))
                .unwrap()
                .set_modified(odd)
                .unwrap();
        }

        let report = Pipeline::new(BuildOptions {
            source_dir: src,
            output_dir: tmp.path().join("dist"),
            build_root: Some(tmp.path().join("builds")),
            verify: true,
            ..BuildOptions::default()
        })
        .run()
        .unwrap();
        assert!(report.verified);
    }

    #[test]
    fn test_build_root_as_source_names_build_root() {
        let tmp = tempdir().unwrap();
        let src = source_tree(tmp.path());

        let err = Pipeline::new(BuildOptions {
            source_dir: src.clone(),
            output_dir: tmp.path().join("dist"),
            build_root: Some(src),
            ..BuildOptions::default()
        })
        .run()
        .unwrap_err();

        assert_eq!(err.kind(), "InvalidArgument");
        assert!(err.to_string().contains("build directory root"), "{}", err);
    }

    #[test]
    fn test_glob_literal_escapes() {
        assert_eq!(glob_literal(Path::new("out/[v1]")), "out/\\[v1\\]");
        let rule = GlobRule::new("*").unwrap().excluding(glob_literal(Path::new("a*b"))).unwrap();
        assert!(rule.is_excluded(Path::new("a*b")));
        assert!(!rule.is_excluded(Path::new("axb")));
    }
}

pub mod export;
pub mod extract;
pub mod fingerprint;
pub mod glob;
pub mod hash;
pub mod staging;
pub mod symlink;

pub use export::{ArchiveExporter, Compression, ExportOptions, DEFAULT_EXTENSION};
pub use extract::extract_archive;
pub use fingerprint::{compare_trees, diff_trees, fingerprint, tree_fingerprints, FileFingerprint, TreeMismatch};
pub use glob::{default_rules, GlobRule, RuleConfig};
pub use hash::hash_file;
pub use staging::{create_build_dir, stage, StagedKind, StagedLink, StagingBuilder};
pub use symlink::create_link;

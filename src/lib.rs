// Core modules
pub mod error;
pub mod config;
pub mod core;
pub mod manifest;
pub mod pipeline;

// Command line surface
pub mod cli;

// Re-exports for convenience
pub use error::{PackError, Result};
pub use config::PackConfig;
pub use core::{ArchiveExporter, GlobRule, StagingBuilder};
pub use manifest::{sanitize, VariableEditor, WorkflowManifest};
pub use pipeline::{BuildOptions, BuildReport, Pipeline};

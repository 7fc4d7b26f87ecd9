use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{PackError, Result};
use crate::manifest::WorkflowManifest;

/// Options for setting a variable
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetVariable {
    pub value: String,
    /// `None` keeps whatever flag the entry already has
    pub exportable: Option<bool>,
}

impl SetVariable {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            exportable: None,
        }
    }

    pub fn exportable(mut self, exportable: bool) -> Self {
        self.exportable = Some(exportable);
        self
    }
}

/// A queued change to the manifest's variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableOp {
    Set { name: String, options: SetVariable },
    Unset { name: String },
}

/// Collects variable changes and writes them to the manifest in one go.
///
/// ```no_run
/// use wfpack::manifest::{SetVariable, VariableEditor};
///
/// let mut editor = VariableEditor::new("workflow.toml");
/// editor
///     .set("API_KEY", SetVariable::new("secret").exportable(false))
///     .unset("OLD_SETTING");
/// editor.apply()?;
/// # Ok::<(), wfpack::PackError>(())
/// ```
#[derive(Debug)]
pub struct VariableEditor {
    manifest_path: PathBuf,
    queue: Vec<VariableOp>,
}

impl VariableEditor {
    pub fn new<P: AsRef<Path>>(manifest_path: P) -> Self {
        Self {
            manifest_path: manifest_path.as_ref().to_path_buf(),
            queue: Vec::new(),
        }
    }

    pub fn set(&mut self, name: impl Into<String>, options: SetVariable) -> &mut Self {
        self.queue.push(VariableOp::Set {
            name: name.into(),
            options,
        });
        self
    }

    pub fn unset(&mut self, name: impl Into<String>) -> &mut Self {
        self.queue.push(VariableOp::Unset { name: name.into() });
        self
    }

    pub fn pending(&self) -> &[VariableOp] {
        &self.queue
    }

    /// Apply every queued operation in order and save the manifest once.
    ///
    /// The queue is emptied whether or not this succeeds.
    pub fn apply(&mut self) -> Result<()> {
        let ops = std::mem::take(&mut self.queue);
        if ops.is_empty() {
            return Err(PackError::invalid_argument(
                "variable operations",
                self.manifest_path.display(),
                "no variable operations queued",
            ));
        }

        let mut manifest = WorkflowManifest::load(&self.manifest_path)?;
        for op in &ops {
            match op {
                VariableOp::Set { name, options } => {
                    manifest.set_variable(name, &options.value, options.exportable)?;
                }
                VariableOp::Unset { name } => {
                    if name.is_empty() {
                        return Err(PackError::invalid_argument(
                            "variable name",
                            "",
                            "must not be empty",
                        ));
                    }
                    manifest.remove_variable(name)?;
                }
            }
        }
        manifest.save()?;

        info!(operations = ops.len(), manifest = %self.manifest_path.display(), "variables updated");
        Ok(())
    }
}

use std::path::Path;

use crate::cli::commands::VarCmd;
use crate::cli::ui::{dim, highlight, print_info, print_success};
use crate::config::PackConfig;
use crate::error::Result;
use crate::manifest::{SetVariable, VariableEditor, WorkflowManifest};

/// Handle `wfpack var`
pub fn handle_var(config: &PackConfig, source: &Path, cmd: VarCmd) -> Result<()> {
    let manifest_path = source.join(&config.package.manifest);

    match cmd {
        VarCmd::List => {
            let manifest = WorkflowManifest::load(&manifest_path)?;
            let variables = manifest.variables()?;
            if variables.is_empty() {
                print_info("No variables defined");
            }
            for variable in variables {
                let marker = if variable.is_exportable() {
                    ""
                } else {
                    " (not exported)"
                };
                println!("{}={}{}", highlight(&variable.name), variable.value, dim(marker));
            }
        }
        VarCmd::Set { assignments, no_export } => {
            let mut editor = VariableEditor::new(&manifest_path);
            for (name, value) in &assignments {
                let mut options = SetVariable::new(value.as_str());
                if no_export {
                    options = options.exportable(false);
                }
                editor.set(name.as_str(), options);
            }
            editor.apply()?;
            print_success(&format!("Set {} variable(s) in {}", assignments.len(), manifest_path.display()));
        }
        VarCmd::Unset { names } => {
            let mut editor = VariableEditor::new(&manifest_path);
            for name in &names {
                editor.unset(name.as_str());
            }
            editor.apply()?;
            print_success(&format!("Removed {} variable(s) from {}", names.len(), manifest_path.display()));
        }
    }
    Ok(())
}

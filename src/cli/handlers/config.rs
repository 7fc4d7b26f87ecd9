use std::path::{Path, PathBuf};

use crate::cli::commands::ConfigCmd;
use crate::cli::ui::{highlight, print_success};
use crate::config::{PackConfig, CONFIG_FILE};
use crate::error::{PackError, Result};

/// Handle configuration operations
pub fn handle_config(config: &PackConfig, source: &Path, explicit: Option<&Path>, cmd: Option<ConfigCmd>) -> Result<()> {
    match cmd {
        Some(ConfigCmd::Show) | None => {
            let rendered = config.render().map_err(|message| PackError::Config { message, path: None })?;
            print!("{}", rendered);
        }
        Some(ConfigCmd::Init { force }) => {
            let path: PathBuf = explicit
                .map(Path::to_path_buf)
                .unwrap_or_else(|| source.join(CONFIG_FILE));
            if path.exists() && !force {
                return Err(PackError::invalid_argument(
                    "config file",
                    path.display(),
                    "already exists (use --force to overwrite)",
                ));
            }
            config.save(&path)?;
            print_success(&format!("Wrote {}", highlight(&path.display().to_string())));
        }
    }
    Ok(())
}

pub mod build;
pub mod config;
pub mod stage;
pub mod vars;
pub mod verify;

pub use build::*;
pub use config::*;
pub use stage::*;
pub use vars::*;
pub use verify::*;

use crate::config::{PackConfig, CONFIG_FILE};
use crate::core::glob::GlobRule;
use crate::error::Result;

/// Rules for a command: `--include` patterns replace the configured rules,
/// `--exclude` patterns are attached to every rule in effect. The config
/// file itself is never staged.
pub fn command_rules(config: &PackConfig, include: &[String], exclude: &[String]) -> Result<Vec<GlobRule>> {
    let mut excludes = exclude.to_vec();
    excludes.push(CONFIG_FILE.to_string());

    if include.is_empty() {
        let mut rules = config.glob_rules()?;
        for pattern in &excludes {
            rules = rules
                .iter()
                .map(|rule| rule.excluding(pattern.clone()))
                .collect::<Result<Vec<_>>>()?;
        }
        Ok(rules)
    } else {
        include
            .iter()
            .map(|pattern| GlobRule::with_excludes(pattern.clone(), excludes.clone()))
            .collect()
    }
}

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::export::{Compression, ExportOptions, DEFAULT_EXTENSION};
use crate::core::glob::{default_rules, GlobRule, RuleConfig};
use crate::error::{ErrorContext, PackError, Result};
use crate::manifest::DEFAULT_MANIFEST;

/// Project configuration file, looked up in the source directory
pub const CONFIG_FILE: &str = "wfpack.toml";

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Main wfpack configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackConfig {
    pub package: PackageConfig,
    /// Staging rules, applied in order
    pub rules: Vec<RuleConfig>,
    pub logging: LoggingConfig,
}

/// Packaging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageConfig {
    /// Manifest path relative to the source directory
    pub manifest: PathBuf,
    /// Archive extension, without the dot
    pub extension: String,
    /// Output directory, relative to the source directory unless absolute
    pub output: PathBuf,
    /// Whether staged links point at their targets relatively
    pub relative_links: bool,
    pub compression: Compression,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            package: PackageConfig::default(),
            rules: default_rules(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            manifest: PathBuf::from(DEFAULT_MANIFEST),
            extension: DEFAULT_EXTENSION.to_string(),
            output: PathBuf::from("dist"),
            relative_links: true,
            compression: Compression::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl PackConfig {
    /// Load configuration from file or fall back to defaults
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        if config_path.exists() {
            let content = fs::read_to_string(config_path)
                .with_io_context(|| format!("reading config file {}", config_path.display()))?;

            let config: Self = toml::from_str(&content).map_err(|e| PackError::Config {
                message: format!("Invalid TOML: {}", e),
                path: Some(config_path.to_path_buf()),
            })?;
            config.validate().map_err(|message| PackError::Config {
                message,
                path: Some(config_path.to_path_buf()),
            })?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Configuration for `source_dir`: `explicit` if given, otherwise
    /// `wfpack.toml` in the source directory.
    pub fn load_for(source_dir: &Path, explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) if !path.exists() => Err(PackError::Config {
                message: "config file does not exist".to_string(),
                path: Some(path.to_path_buf()),
            }),
            Some(path) => Self::load(path),
            None => Self::load(source_dir.join(CONFIG_FILE)),
        }
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, config_path: P) -> Result<()> {
        let config_path = config_path.as_ref();

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .with_io_context(|| format!("creating config directory {}", parent.display()))?;
        }

        let content = self.render().map_err(|e| PackError::Config {
            message: e,
            path: Some(config_path.to_path_buf()),
        })?;

        fs::write(config_path, content)
            .with_io_context(|| format!("writing config file {}", config_path.display()))?;

        Ok(())
    }

    pub fn render(&self) -> std::result::Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize config: {}", e))
    }

    /// Compile the configured staging rules
    pub fn glob_rules(&self) -> Result<Vec<GlobRule>> {
        self.rules.iter().map(GlobRule::from_config).collect()
    }

    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            manifest: self.package.manifest.clone(),
            extension: self.package.extension.clone(),
            compression: self.package.compression,
        }
    }

    /// Output directory resolved against `source_dir`
    pub fn output_dir(&self, source_dir: &Path) -> PathBuf {
        if self.package.output.is_absolute() {
            self.package.output.clone()
        } else {
            source_dir.join(&self.package.output)
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.package.manifest.as_os_str().is_empty() {
            return Err("package.manifest must not be empty".to_string());
        }
        if self.package.manifest.is_absolute() {
            return Err("package.manifest must be relative to the source directory".to_string());
        }
        if self.package.extension.contains(['/', '\\', '\0']) || self.package.extension.starts_with('.') {
            return Err(format!("invalid package.extension '{}'", self.package.extension));
        }
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "logging.level must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                self.logging.level
            ));
        }
        Ok(())
    }
}

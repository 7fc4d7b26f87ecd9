use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "wfpack", version, about = "Stage, sanitize and package workflow directories")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Config file (defaults to wfpack.toml in the source directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stage, sanitize and export SOURCE into an archive
    Build {
        #[arg(default_value = ".")]
        source: PathBuf,
        /// Output directory (defaults to package.output from the config)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Inclusion pattern; replaces the configured rules
        #[arg(long = "include", value_name = "PATTERN")]
        include: Vec<String>,
        /// Exclusion pattern, attached to every rule
        #[arg(long = "exclude", value_name = "PATTERN")]
        exclude: Vec<String>,
        /// Stage absolute links instead of relative ones
        #[arg(long)]
        absolute: bool,
        /// Archive extension, without the dot
        #[arg(long)]
        extension: Option<String>,
        /// Parent directory for the temporary build directory
        #[arg(long)]
        build_dir: Option<PathBuf>,
        /// Leave the build directory in place
        #[arg(long)]
        keep_build_dir: bool,
        /// Extract the archive again and compare it with what was staged
        #[arg(long)]
        verify: bool,
    },

    /// Stage and sanitize SOURCE into BUILD_DIR without exporting
    Stage {
        source: PathBuf,
        build_dir: PathBuf,
        #[arg(long = "include", value_name = "PATTERN")]
        include: Vec<String>,
        #[arg(long = "exclude", value_name = "PATTERN")]
        exclude: Vec<String>,
        #[arg(long)]
        absolute: bool,
    },

    /// Compare two directories; RIGHT may also be an archive
    Verify {
        left: PathBuf,
        right: PathBuf,
    },

    /// Edit the manifest's variables
    Var {
        /// Source directory holding the manifest
        #[arg(long, default_value = ".")]
        source: PathBuf,
        #[command(subcommand)]
        cmd: VarCmd,
    },

    /// Show or write the configuration
    Config {
        #[arg(long, default_value = ".")]
        source: PathBuf,
        #[command(subcommand)]
        cmd: Option<ConfigCmd>,
    },
}

impl Commands {
    /// Directory whose wfpack.toml applies to this command
    pub fn source_dir(&self) -> &Path {
        match self {
            Commands::Build { source, .. }
            | Commands::Stage { source, .. }
            | Commands::Var { source, .. }
            | Commands::Config { source, .. } => source.as_path(),
            Commands::Verify { .. } => Path::new("."),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum VarCmd {
    /// List variables and whether they are exported
    List,
    /// Set one or more variables
    Set {
        #[arg(required = true, value_parser = parse_assignment, value_name = "NAME=VALUE")]
        assignments: Vec<(String, String)>,
        /// Mark the variables as not exportable
        #[arg(long)]
        no_export: bool,
    },
    /// Remove one or more variables
    Unset {
        #[arg(required = true)]
        names: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCmd {
    /// Show the effective configuration
    Show,
    /// Write the effective configuration to disk
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn parse_assignment(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("Invalid variable format '{}'. Expected NAME=VALUE", s))?;
    if pos == 0 {
        return Err(format!("Invalid variable format '{}'. Name must not be empty", s));
    }
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

use std::process;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use wfpack::cli::handlers::{self, BuildArgs};
use wfpack::cli::ui::{print_error, set_color};
use wfpack::cli::{Cli, Commands};
use wfpack::config::PackConfig;
use wfpack::error::Result;

fn main() {
    let cli = Cli::parse();

    if cli.no_color {
        set_color(false);
    }

    let config = match PackConfig::load_for(cli.command.source_dir(), cli.config.as_deref()) {
        Ok(config) => config,
        Err(error) => {
            print_error(&error);
            process::exit(1);
        }
    };

    let level = if cli.verbose { "debug" } else { config.logging.level.as_str() };
    if let Err(e) = init_logging(level) {
        eprintln!("Failed to initialize logging: {:#}", e);
    }

    if let Err(error) = run_app(cli, &config) {
        print_error(&error);
        process::exit(1);
    }
}

fn run_app(cli: Cli, config: &PackConfig) -> Result<()> {
    let explicit_config = cli.config;

    match cli.command {
        Commands::Build {
            source,
            output,
            include,
            exclude,
            absolute,
            extension,
            build_dir,
            keep_build_dir,
            verify,
        } => handlers::handle_build(
            config,
            BuildArgs {
                source,
                output,
                include,
                exclude,
                absolute,
                extension,
                build_dir,
                keep_build_dir,
                verify,
            },
        ),
        Commands::Stage {
            source,
            build_dir,
            include,
            exclude,
            absolute,
        } => handlers::handle_stage(config, &source, &build_dir, &include, &exclude, absolute),
        Commands::Verify { left, right } => handlers::handle_verify(&left, &right),
        Commands::Var { source, cmd } => handlers::handle_var(config, &source, cmd),
        Commands::Config { source, cmd } => {
            handlers::handle_config(config, &source, explicit_config.as_deref(), cmd)
        }
    }
}

/// Log events go to stderr so stdout stays parseable
fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(format!("wfpack={}", level))
        .with_context(|| format!("invalid log level '{}'", level))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()
        .context("installing log subscriber")?;
    Ok(())
}

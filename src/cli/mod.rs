//! Command line interface for the macOS bundler.
//!
//! Parses arguments, layers them over the configuration file, and
//! dispatches to one command per pipeline component.

pub mod args;
pub mod commands;
mod output;

pub use args::{Args, Command, RuntimeConfig};
pub use output::OutputManager;

use crate::{config::ConfigFile, error::Result};

/// Main CLI entry point
pub async fn run(args: Args) -> Result<()> {
    args.validate()?;

    let cwd = std::env::current_dir()?;
    let file = ConfigFile::discover(args.config.as_deref(), &cwd)?;
    let config = RuntimeConfig::new(&args, file);
    if args.is_dry_run() {
        config.output().verbose("Dry run: no files will be modified")?;
    }

    match args.command {
        Command::Create(create) => commands::execute_create(create, &config).await,
        Command::Fix(fix) => commands::execute_fix(fix, &config).await,
        Command::Sign(sign) => commands::execute_sign(sign, &config).await,
        Command::Package(package) => commands::execute_package(package, &config).await,
    }
}
